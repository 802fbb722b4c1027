//! Event destinations and their configuration

pub mod batching;
pub mod buffer;
pub mod console;
pub mod file;
pub mod filtered;

pub use batching::{BatchingObserver, BatchingObserverBuilder, SummaryProcessor};
pub use buffer::BufferObserver;
pub use console::ConsoleObserver;
pub use file::FileObserver;
pub use filtered::{FilteredObserver, LevelThresholdObserver};

use crate::batch::{FlushExecutor, Scheduler};
use crate::core::config::{parse_bool, BatchingConfig};
use crate::core::{
    EventFormatter, Filter, LogLevel, LoggerError, Marker, ObserverRef, OutputFormat, Predicate,
    Result, TimestampFormat,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Destination kind with its own settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DestinationSpec {
    Console {
        #[serde(default)]
        format: OutputFormat,
        #[serde(default)]
        timestamp: Option<String>,
        #[serde(default = "default_colors")]
        colors: bool,
    },
    File {
        path: PathBuf,
        #[serde(default)]
        format: OutputFormat,
        #[serde(default)]
        timestamp: Option<String>,
        #[serde(default)]
        lock: bool,
        #[serde(default)]
        location: bool,
    },
    Buffer {
        #[serde(default)]
        capacity: Option<usize>,
    },
}

fn default_colors() -> bool {
    true
}

/// Destination-side filtering options
///
/// `require_mdc`/`suppress_mdc` map a key to `|`-separated values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    pub threshold: Option<String>,
    pub filter: Option<String>,
    pub require_markers: Vec<String>,
    pub suppress_markers: Vec<String>,
    pub require_mdc: BTreeMap<String, String>,
    pub suppress_mdc: BTreeMap<String, String>,
}

impl FilterOptions {
    pub fn is_empty(&self) -> bool {
        self == &FilterOptions::default()
    }

    /// Marker and MDC conditions combined
    pub fn condition(&self) -> Predicate {
        let mut conditions = Vec::new();
        if !self.require_markers.is_empty() {
            conditions.push(Predicate::required_marker(
                self.require_markers.iter().map(|m| Marker::new(m.as_str())),
            ));
        }
        if !self.suppress_markers.is_empty() {
            conditions.push(Predicate::suppressed_marker(
                self.suppress_markers.iter().map(|m| Marker::new(m.as_str())),
            ));
        }
        for (key, values) in &self.require_mdc {
            conditions.push(Predicate::required_mdc(key.as_str(), split_values(values)));
        }
        for (key, values) in &self.suppress_mdc {
            conditions.push(Predicate::suppressed_mdc(key.as_str(), split_values(values)));
        }
        Predicate::all_of(conditions)
    }

    /// Wrap `observer` in the cheapest filtering observer that applies
    pub fn apply(&self, observer: ObserverRef) -> Result<ObserverRef> {
        if self.is_empty() {
            return Ok(observer);
        }
        let threshold = self.threshold.as_deref().map(str::parse::<LogLevel>).transpose()?;
        let condition = self.condition();
        if self.filter.is_none() && condition.is_always() {
            if let Some(threshold) = threshold {
                return Ok(Arc::new(LevelThresholdObserver::new(observer, threshold)));
            }
        }

        let mut filter = match self.filter {
            Some(ref rules) => Filter::parse(rules)?,
            None => Filter::uniform(Predicate::Always),
        };
        if let Some(threshold) = threshold {
            filter = Filter::from_predicates(LogLevel::ALL.map(|level| {
                if level >= threshold {
                    filter.predicate(level).clone()
                } else {
                    Predicate::Never
                }
            }));
        }
        Ok(Arc::new(FilteredObserver::new(observer, filter, condition)))
    }
}

fn split_values(values: &str) -> Vec<String> {
    values
        .split('|')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_list(values: &str) -> Vec<String> {
    values
        .split([',', '|'])
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Declarative definition of a named observer
///
/// ```
/// use rust_logevents::observers::ObserverSpec;
///
/// let spec: ObserverSpec = serde_json::from_str(
///     r#"{ "kind": "buffer", "capacity": 100, "threshold": "WARN" }"#,
/// ).unwrap();
/// let observer = spec.build().unwrap();
/// assert_eq!(observer.name(), "buffer");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverSpec {
    #[serde(flatten)]
    pub destination: DestinationSpec,
    #[serde(flatten)]
    pub filter: FilterOptions,
    /// Collect events and write one summary line per group instead
    #[serde(default)]
    pub batching: Option<BatchingConfig>,
}

impl ObserverSpec {
    pub fn new(destination: DestinationSpec) -> Self {
        Self {
            destination,
            filter: FilterOptions::default(),
            batching: None,
        }
    }

    pub fn console() -> Self {
        Self::new(DestinationSpec::Console {
            format: OutputFormat::Text,
            timestamp: None,
            colors: true,
        })
    }

    pub fn buffer(capacity: Option<usize>) -> Self {
        Self::new(DestinationSpec::Buffer { capacity })
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(DestinationSpec::File {
            path: path.into(),
            format: OutputFormat::Text,
            timestamp: None,
            lock: false,
            location: false,
        })
    }

    /// Read `observer.NAME.*` properties; the empty key holds the kind
    pub fn from_properties(name: &str, properties: &BTreeMap<String, String>) -> Result<Self> {
        let component = format!("observer.{}", name);
        let get = |key: &str| properties.get(key).map(String::as_str);
        let format = get("format").map(str::parse).transpose()?.unwrap_or_default();
        let timestamp = get("timestamp").map(str::to_string);

        let kind = get("").unwrap_or(name);
        let destination = match kind.trim() {
            "console" => DestinationSpec::Console {
                format,
                timestamp,
                colors: get("colors").map(|v| parse_bool(&component, v)).transpose()?.unwrap_or(true),
            },
            "file" => DestinationSpec::File {
                path: get("path")
                    .map(PathBuf::from)
                    .ok_or_else(|| LoggerError::config(component.as_str(), "missing path"))?,
                format,
                timestamp,
                lock: get("lock").map(|v| parse_bool(&component, v)).transpose()?.unwrap_or(false),
                location: get("location")
                    .map(|v| parse_bool(&component, v))
                    .transpose()?
                    .unwrap_or(false),
            },
            "buffer" => DestinationSpec::Buffer {
                capacity: get("capacity")
                    .map(|v| {
                        v.trim().parse::<usize>().map_err(|e| {
                            LoggerError::config(component.as_str(), format!("capacity: {}", e))
                        })
                    })
                    .transpose()?,
            },
            other => {
                return Err(LoggerError::config(
                    component,
                    format!("unknown observer kind '{}'", other),
                ))
            }
        };

        let mut filter = FilterOptions {
            threshold: get("threshold").map(str::to_string),
            filter: get("filter").map(str::to_string),
            require_markers: get("require_markers").map(split_list).unwrap_or_default(),
            suppress_markers: get("suppress_markers").map(split_list).unwrap_or_default(),
            ..Default::default()
        };
        let mut batching_properties = BTreeMap::new();
        for (key, value) in properties {
            if let Some(mdc_key) = key.strip_prefix("require_mdc.") {
                filter.require_mdc.insert(mdc_key.to_string(), value.clone());
            } else if let Some(mdc_key) = key.strip_prefix("suppress_mdc.") {
                filter.suppress_mdc.insert(mdc_key.to_string(), value.clone());
            } else if let Some(batching_key) = key.strip_prefix("batching.") {
                batching_properties.insert(batching_key.to_string(), value.clone());
            }
        }
        let batching = match get("batching") {
            Some(value) if parse_bool(&component, value)? => Some(BatchingConfig::from_properties(&batching_properties)),
            _ if !batching_properties.is_empty() => Some(BatchingConfig::from_properties(&batching_properties)),
            _ => None,
        };

        let spec = Self {
            destination,
            filter,
            batching,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check rule strings and durations without creating anything
    pub fn validate(&self) -> Result<()> {
        if let Some(ref threshold) = self.filter.threshold {
            threshold.parse::<LogLevel>()?;
        }
        if let Some(ref rules) = self.filter.filter {
            Filter::parse(rules)?;
        }
        for values in self.filter.require_mdc.values().chain(self.filter.suppress_mdc.values()) {
            if split_values(values).is_empty() {
                return Err(LoggerError::invalid_rule(values.as_str(), "no MDC values"));
            }
        }
        if let Some(ref batching) = self.batching {
            batching.policy.policy()?;
            for marker in batching.markers.values() {
                marker.policy.policy()?;
            }
        }
        Ok(())
    }

    pub fn build(&self) -> Result<ObserverRef> {
        self.build_with(None)
    }

    /// Build, flushing batches on `scheduler` instead of the global executor
    pub fn build_with(&self, scheduler: Option<Arc<dyn Scheduler>>) -> Result<ObserverRef> {
        let destination: ObserverRef = match &self.destination {
            DestinationSpec::Console {
                format,
                timestamp,
                colors,
            } => Arc::new(
                ConsoleObserver::with_colors(*colors)
                    .with_formatter(formatter(*format, timestamp.as_deref(), false)?),
            ),
            DestinationSpec::File {
                path,
                format,
                timestamp,
                lock,
                location,
            } => Arc::new(
                FileObserver::open(path)?
                    .with_formatter(formatter(*format, timestamp.as_deref(), *location)?)
                    .with_locking(*lock),
            ),
            DestinationSpec::Buffer { capacity } => Arc::new(match capacity {
                Some(capacity) => BufferObserver::with_capacity(*capacity),
                None => BufferObserver::new(),
            }),
        };

        let destination = match &self.batching {
            Some(batching) => {
                let scheduler = match scheduler {
                    Some(scheduler) => scheduler,
                    None => FlushExecutor::global()? as Arc<dyn Scheduler>,
                };
                let name = format!("batching:{}", destination.name());
                Arc::new(BatchingObserver::from_config(
                    name,
                    batching,
                    Arc::new(SummaryProcessor::new(destination)),
                    scheduler,
                )?) as ObserverRef
            }
            None => destination,
        };
        self.filter.apply(destination)
    }
}

fn formatter(format: OutputFormat, timestamp: Option<&str>, location: bool) -> Result<EventFormatter> {
    let timestamp = timestamp.map(str::parse::<TimestampFormat>).transpose()?.unwrap_or_default();
    Ok(EventFormatter::new(format)
        .with_timestamp_format(timestamp)
        .with_location(location))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LogEvent, Mdc, Observer};
    use crate::batch::ManualScheduler;

    fn properties(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_buffer_spec_from_properties() {
        let spec = ObserverSpec::from_properties(
            "mem",
            &properties(&[("", "buffer"), ("capacity", "5"), ("threshold", "WARN")]),
        )
        .unwrap();
        assert_eq!(spec.destination, DestinationSpec::Buffer { capacity: Some(5) });
        assert_eq!(spec.filter.threshold.as_deref(), Some("WARN"));

        let observer = spec.build().unwrap();
        assert!(observer
            .clone()
            .filtered_on(LogLevel::Info, &Predicate::Always)
            .is_null());
        assert!(!observer
            .filtered_on(LogLevel::Error, &Predicate::Always)
            .is_null());
    }

    #[test]
    fn test_kind_defaults_to_name() {
        let spec = ObserverSpec::from_properties("console", &BTreeMap::new()).unwrap();
        assert!(matches!(spec.destination, DestinationSpec::Console { colors: true, .. }));
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        assert!(ObserverSpec::from_properties("x", &properties(&[("", "smoke-signal")])).is_err());
        assert!(ObserverSpec::from_properties("f", &properties(&[("", "file")])).is_err());
        assert!(ObserverSpec::from_properties(
            "b",
            &properties(&[("", "buffer"), ("threshold", "LOUD")])
        )
        .is_err());
        assert!(ObserverSpec::from_properties(
            "b",
            &properties(&[("", "buffer"), ("batching.cooldownTime", "later")])
        )
        .is_err());
    }

    #[test]
    fn test_mdc_and_marker_options() {
        Mdc::clear();
        let spec = ObserverSpec::from_properties(
            "audit",
            &properties(&[
                ("", "buffer"),
                ("require_mdc.user", "admin|tester"),
                ("suppress_markers", "NOISE"),
            ]),
        )
        .unwrap();
        let observer = spec.build().unwrap();
        let info = observer.filtered_on(LogLevel::Info, &Predicate::Always);
        assert!(!info.is_enabled());

        let _user = Mdc::put("user", "tester");
        assert!(info.is_enabled());
        assert!(!info.is_enabled_for(Some(&Marker::new("NOISE"))));
    }

    #[test]
    fn test_batched_buffer() {
        let scheduler = ManualScheduler::new();
        let spec = ObserverSpec::from_properties(
            "summary",
            &properties(&[("", "buffer"), ("batching.idleThreshold", "PT1S")]),
        )
        .unwrap();
        assert!(spec.batching.is_some());

        let observer = spec.build_with(Some(Arc::new(scheduler.clone()))).unwrap();
        assert_eq!(observer.name(), "batching:buffer");
        for _ in 0..2 {
            observer
                .log_event(&LogEvent::new(Arc::from("app"), LogLevel::Warn, "slow"))
                .unwrap();
        }
        assert_eq!(scheduler.fire_all(), 1);
    }

    #[test]
    fn test_batched_buffer_with_huge_maximum_wait() {
        let scheduler = ManualScheduler::new();
        let spec = ObserverSpec::from_properties(
            "buffer",
            &properties(&[
                ("", "buffer"),
                ("batching.maximumWaitTime", "PT10000000000000000000S"),
            ]),
        )
        .unwrap();
        let observer = spec.build_with(Some(Arc::new(scheduler.clone()))).unwrap();

        for _ in 0..2 {
            observer
                .log_event(&LogEvent::new(Arc::from("app"), LogLevel::Warn, "slow"))
                .unwrap();
        }
        assert_eq!(
            scheduler.requested_delays(),
            vec![crate::batch::DEFAULT_IDLE_THRESHOLD; 2]
        );
        assert_eq!(scheduler.fire_all(), 1);
    }

    #[test]
    fn test_json_spec() {
        let spec: ObserverSpec = serde_json::from_str(
            r#"{
                "kind": "console",
                "format": "json",
                "timestamp": "unix_millis",
                "suppress_markers": ["NOISE"]
            }"#,
        )
        .unwrap();
        assert!(matches!(
            spec.destination,
            DestinationSpec::Console { format: OutputFormat::Json, colors: true, .. }
        ));
        assert_eq!(spec.filter.suppress_markers, vec!["NOISE".to_string()]);
        assert!(spec.build().is_ok());
    }
}
