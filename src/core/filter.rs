//! Per-level predicate tables and the rule grammar that builds them
//!
//! ```text
//! filter    := head ("," clause)*
//! head      := LEVEL | "NONE" | clause
//! clause    := (LEVEL | "NONE") "@" condition ("&" condition)*
//! condition := "mdc:" KEY ("=" | "!=") VALUE ("|" VALUE)*
//!            | "marker" ("=" | "!=") NAME ("|" NAME)*
//! ```

use super::error::{LoggerError, Result};
use super::log_level::LogLevel;
use super::marker::Marker;
use super::predicate::Predicate;
use std::fmt;
use std::str::FromStr;

const NONE_TOKEN: &str = "NONE";

/// One predicate per severity level
///
/// # Example
///
/// ```
/// use rust_logevents::{Filter, LogLevel, Predicate};
///
/// let filter: Filter = "WARN,DEBUG@mdc:user=admin".parse().unwrap();
/// assert!(filter.predicate(LogLevel::Error).is_always());
/// assert!(filter.predicate(LogLevel::Trace).is_never());
/// assert_eq!(filter.threshold(), Some(LogLevel::Debug));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    predicates: [Predicate; 5],
}

impl Filter {
    /// Everything at or above `threshold`
    pub fn at_level(threshold: LogLevel) -> Self {
        Self {
            predicates: LogLevel::ALL.map(|level| {
                if level >= threshold {
                    Predicate::Always
                } else {
                    Predicate::Never
                }
            }),
        }
    }

    /// Nothing at any level
    pub fn never() -> Self {
        Self::uniform(Predicate::Never)
    }

    /// Every level defers to the parent filter
    pub fn inherit() -> Self {
        Self::uniform(Predicate::Inherit)
    }

    pub fn uniform(predicate: Predicate) -> Self {
        Self {
            predicates: LogLevel::ALL.map(|_| predicate.clone()),
        }
    }

    pub fn from_predicates(predicates: [Predicate; 5]) -> Self {
        Self { predicates }
    }

    pub fn parse(rules: &str) -> Result<Self> {
        let mut parts = rules.split(',').map(str::trim);
        let head = parts.next().unwrap_or_default();
        if head.is_empty() {
            return Err(LoggerError::invalid_rule(rules, "empty filter"));
        }

        let mut filter = if head.contains('@') {
            let mut filter = Self::inherit();
            filter.apply_clause(head)?;
            filter
        } else if head.eq_ignore_ascii_case(NONE_TOKEN) {
            Self::never()
        } else {
            Self::at_level(head.parse()?)
        };

        for clause in parts {
            if clause.is_empty() {
                continue;
            }
            if !clause.contains('@') {
                return Err(LoggerError::invalid_rule(
                    clause,
                    "only the first part may be a plain level",
                ));
            }
            filter.apply_clause(clause)?;
        }
        Ok(filter)
    }

    fn apply_clause(&mut self, clause: &str) -> Result<()> {
        let (level, conditions) = clause
            .split_once('@')
            .ok_or_else(|| LoggerError::invalid_rule(clause, "expected LEVEL@condition"))?;
        let condition = Predicate::all_of(
            conditions
                .split('&')
                .map(|c| parse_condition(c.trim()))
                .collect::<Result<Vec<_>>>()?,
        );

        let level = level.trim();
        if level.eq_ignore_ascii_case(NONE_TOKEN) {
            let negated = condition.negate()?;
            for predicate in self.predicates.iter_mut() {
                *predicate = predicate.and(&negated);
            }
            Ok(())
        } else {
            self.add_condition(level.parse()?, &condition)
        }
    }

    /// Log events matching `condition` from `level` upwards, and suppress them below
    pub fn add_condition(&mut self, level: LogLevel, condition: &Predicate) -> Result<()> {
        let negated = condition.negate()?;
        for l in LogLevel::ALL {
            let current = &self.predicates[l.index()];
            self.predicates[l.index()] = if l >= level {
                current.or(condition)
            } else {
                current.and(&negated)
            };
        }
        Ok(())
    }

    #[inline]
    pub fn predicate(&self, level: LogLevel) -> &Predicate {
        &self.predicates[level.index()]
    }

    pub fn predicates(&self) -> &[Predicate; 5] {
        &self.predicates
    }

    /// Least severe level whose predicate is not statically `Never`
    pub fn threshold(&self) -> Option<LogLevel> {
        LogLevel::ALL
            .into_iter()
            .find(|level| !self.predicate(*level).is_never())
    }

    /// Resolve `Inherit` placeholders level by level against `parent`
    #[must_use]
    pub fn with_parent(&self, parent: &Filter) -> Filter {
        Self {
            predicates: LogLevel::ALL
                .map(|level| self.predicate(level).with_parent(parent.predicate(level))),
        }
    }

    pub fn contains_inherit(&self) -> bool {
        self.predicates.iter().any(Predicate::contains_inherit)
    }

    /// Apply an extra condition to every level
    #[must_use]
    pub fn and(&self, condition: &Predicate) -> Filter {
        Self {
            predicates: LogLevel::ALL.map(|level| self.predicate(level).and(condition)),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::at_level(LogLevel::Info)
    }
}

impl FromStr for Filter {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<_> = LogLevel::ALL
            .iter()
            .rev()
            .map(|level| format!("{}: {}", level, self.predicate(*level)))
            .collect();
        write!(f, "Filter{{{}}}", parts.join(", "))
    }
}

/// Parse one `mdc:` or `marker` condition
pub fn parse_condition(rule: &str) -> Result<Predicate> {
    if let Some(rest) = rule.strip_prefix("mdc:") {
        let (key, values, negated) = split_assignment(rule, rest)?;
        return Ok(if negated {
            Predicate::suppressed_mdc(key, values)
        } else {
            Predicate::required_mdc(key, values)
        });
    }
    if let Some(rest) = rule.strip_prefix("marker") {
        let (key, values, negated) = split_assignment(rule, rest)?;
        if !key.is_empty() {
            return Err(LoggerError::invalid_rule(rule, "expected marker= or marker!="));
        }
        let markers = values.into_iter().map(Marker::new);
        return Ok(if negated {
            Predicate::suppressed_marker(markers)
        } else {
            Predicate::required_marker(markers)
        });
    }
    Err(LoggerError::invalid_rule(
        rule,
        "expected mdc:KEY=VALUES, mdc:KEY!=VALUES, marker=NAMES or marker!=NAMES",
    ))
}

fn split_assignment<'a>(rule: &str, rest: &'a str) -> Result<(&'a str, Vec<&'a str>, bool)> {
    let (key, values) = rest
        .split_once('=')
        .ok_or_else(|| LoggerError::invalid_rule(rule, "expected '=' or '!='"))?;
    let (key, negated) = match key.strip_suffix('!') {
        Some(key) => (key.trim(), true),
        None => (key.trim(), false),
    };
    let values: Vec<&str> = values
        .split('|')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return Err(LoggerError::invalid_rule(rule, "no values given"));
    }
    Ok((key, values, negated))
}
