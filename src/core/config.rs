//! Configuration model and parsers
//!
//! Configurations come either as JSON (deserialized with serde) or in the
//! flat properties form:
//!
//! ```text
//! root=WARN console
//! logger.org.example=INFO,DEBUG@mdc:user=admin buffer,file
//! includeParent.org.example=false
//! observer.file=file
//! observer.file.path=/var/log/app.log
//! observer.file.threshold=INFO
//! ```

use super::error::{LoggerError, Result};
use super::filter::Filter;
use crate::batch::{BatchPolicy, CooldownPolicy, ThrottlePolicy};
use crate::observers::ObserverSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Complete logger configuration, applied with `LoggerHierarchy::apply_configuration`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfiguration {
    pub root: Option<LoggerConfig>,
    pub loggers: BTreeMap<String, LoggerConfig>,
    pub observers: BTreeMap<String, ObserverSpec>,
}

/// Configuration of one logger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Level or filter rule string, e.g. `WARN` or `WARN,INFO@mdc:user=admin`
    pub filter: Option<String>,
    /// Names of registered or declared observers
    pub observers: Option<Vec<String>>,
    /// Whether the parent's observers also receive this logger's events
    pub include_parent: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            filter: None,
            observers: None,
            include_parent: true,
        }
    }
}

impl LoggerConfig {
    pub fn parse_filter(&self) -> Result<Option<Filter>> {
        self.filter.as_deref().map(Filter::parse).transpose()
    }

    /// Parse the `FILTER [observer,observer]` property value
    fn from_property_value(value: &str) -> Self {
        let mut tokens = value.split_whitespace();
        let filter = tokens.next().map(str::to_string);
        let observers: Vec<String> = tokens
            .flat_map(|t| t.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            filter,
            observers: if observers.is_empty() {
                None
            } else {
                Some(observers)
            },
            include_parent: true,
        }
    }
}

impl LogConfiguration {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse `key=value` lines; `#` and `!` start comments
    pub fn from_properties(text: &str) -> Result<Self> {
        Self::from_property_map(&parse_properties(text))
    }

    pub fn from_property_map(properties: &BTreeMap<String, String>) -> Result<Self> {
        let mut configuration = LogConfiguration::default();
        let mut include_parent = BTreeMap::new();
        let mut observer_properties: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

        for (key, value) in properties {
            if key == "root" {
                configuration.root = Some(LoggerConfig::from_property_value(value));
            } else if let Some(name) = key.strip_prefix("logger.") {
                configuration
                    .loggers
                    .insert(name.to_string(), LoggerConfig::from_property_value(value));
            } else if let Some(name) = key.strip_prefix("includeParent.") {
                include_parent.insert(name.to_string(), parse_bool(key, value)?);
            } else if let Some(rest) = key.strip_prefix("observer.") {
                let (name, property) = match rest.split_once('.') {
                    Some((name, property)) => (name, property),
                    None => (rest, ""),
                };
                observer_properties
                    .entry(name.to_string())
                    .or_default()
                    .insert(property.to_string(), value.clone());
            }
        }

        for (name, flag) in include_parent {
            configuration
                .loggers
                .entry(name)
                .or_default()
                .include_parent = flag;
        }
        for (name, properties) in observer_properties {
            let spec = ObserverSpec::from_properties(&name, &properties)?;
            configuration.observers.insert(name, spec);
        }
        Ok(configuration)
    }
}

/// Split properties text into a key/value map
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

pub(crate) fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(LoggerError::config(key, format!("expected true or false, got '{}'", value))),
    }
}

/// Parse an ISO-8601 duration such as `PT30S`, `PT1H30M`, `P1D` or `PT0.5S`
pub fn parse_duration(value: &str) -> Result<Duration> {
    let invalid = || LoggerError::invalid_duration(value);
    let upper = value.trim().to_ascii_uppercase();
    let rest = upper.strip_prefix('P').ok_or_else(invalid)?;
    let (date, time) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };

    let (date_secs, date_parts) =
        sum_components(date, &[('W', 604_800.0), ('D', 86_400.0)]).ok_or_else(invalid)?;
    let (time_secs, time_parts) = match time {
        Some(time) => {
            let parsed = sum_components(time, &[('H', 3_600.0), ('M', 60.0), ('S', 1.0)])
                .ok_or_else(invalid)?;
            if parsed.1 == 0 {
                return Err(invalid());
            }
            parsed
        }
        None => (0.0, 0),
    };
    if date_parts + time_parts == 0 {
        return Err(invalid());
    }

    Duration::try_from_secs_f64(date_secs + time_secs).map_err(|_| invalid())
}

/// Sum `<number><unit>` pairs, units in the given order
fn sum_components(section: &str, units: &[(char, f64)]) -> Option<(f64, usize)> {
    let mut total = 0.0;
    let mut count = 0;
    let mut next_unit = 0;
    let mut number = String::new();
    for c in section.chars() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        let offset = units.get(next_unit..)?.iter().position(|(unit, _)| *unit == c)?;
        let index = next_unit + offset;
        let amount: f64 = number.parse().ok()?;
        total += amount * units[index].1;
        count += 1;
        next_unit = index + 1;
        number.clear();
    }
    if number.is_empty() {
        Some((total, count))
    } else {
        None
    }
}

/// Parse a whitespace or comma separated list of durations
pub fn parse_duration_list(value: &str) -> Result<Vec<Duration>> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .map(parse_duration)
        .collect()
}

/// Timing settings of one batcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchPolicyConfig {
    /// Escalating delays such as `PT30S PT5M PT15M`; selects the throttle policy
    pub throttle: Option<String>,
    pub idle_threshold: Option<String>,
    pub cooldown_time: Option<String>,
    pub maximum_wait_time: Option<String>,
}

impl BatchPolicyConfig {
    pub fn policy(&self) -> Result<BatchPolicy> {
        if let Some(ref throttle) = self.throttle {
            return Ok(BatchPolicy::Throttle(ThrottlePolicy::new(
                parse_duration_list(throttle)?,
            )?));
        }
        let mut policy = CooldownPolicy::default();
        if let Some(ref idle) = self.idle_threshold {
            policy.idle_threshold = parse_duration(idle)?;
        }
        if let Some(ref cooldown) = self.cooldown_time {
            policy.cooldown_time = parse_duration(cooldown)?;
        }
        if let Some(ref maximum) = self.maximum_wait_time {
            policy.maximum_wait_time = parse_duration(maximum)?;
        }
        Ok(BatchPolicy::Cooldown(policy))
    }

    fn set_property(&mut self, key: &str, value: &str) -> bool {
        let slot = match key {
            "throttle" => &mut self.throttle,
            "idleThreshold" | "idle_threshold" => &mut self.idle_threshold,
            "cooldownTime" | "cooldown_time" => &mut self.cooldown_time,
            "maximumWaitTime" | "maximum_wait_time" => &mut self.maximum_wait_time,
            _ => return false,
        };
        *slot = Some(value.to_string());
        true
    }
}

/// Batcher for events carrying one marker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerBatchingConfig {
    #[serde(flatten)]
    pub policy: BatchPolicyConfig,
    /// Keep a separate batch per value of this MDC key
    pub mdc: Option<String>,
}

/// Batching settings of a destination
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    #[serde(flatten)]
    pub policy: BatchPolicyConfig,
    pub markers: BTreeMap<String, MarkerBatchingConfig>,
}

impl BatchingConfig {
    /// Read `throttle`, `idleThreshold`, `cooldownTime`, `maximumWaitTime`
    /// and `markers.NAME.*` properties; other keys are ignored
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Self {
        let mut config = BatchingConfig::default();
        for (key, value) in properties {
            if config.policy.set_property(key, value) {
                continue;
            }
            if let Some((marker, property)) = key
                .strip_prefix("markers.")
                .and_then(|rest| rest.rsplit_once('.'))
            {
                let entry = config.markers.entry(marker.to_string()).or_default();
                if property == "mdc" {
                    entry.mdc = Some(value.clone());
                } else {
                    entry.policy.set_property(property, value);
                }
            }
        }
        config
    }

    /// Whether any batching-related key was present
    pub fn is_empty(&self) -> bool {
        self == &BatchingConfig::default()
    }
}
