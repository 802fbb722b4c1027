//! Boolean predicates over markers and MDC state
//!
//! Predicates are built once when configuration is applied and evaluated on
//! every log call, so composition reduces eagerly: `and`/`or` absorb `Always`
//! and `Never`, merge compatible marker and MDC sets, and flatten nested
//! `All`/`Any` lists instead of wrapping.

use super::error::{LoggerError, Result};
use super::log_context::Mdc;
use super::log_event::LogEvent;
use super::marker::{Marker, MarkerSet};
use std::collections::BTreeSet;
use std::fmt;

/// A condition deciding whether an event is forwarded
///
/// # Example
///
/// ```
/// use rust_logevents::{Marker, Predicate};
///
/// let ops = Predicate::required_marker([Marker::new("OPS")]);
/// assert_eq!(ops.and(&Predicate::Always), ops);
/// assert_eq!(ops.and(&Predicate::Never), Predicate::Never);
/// assert!(ops.test_marker(Some(&Marker::new("OPS"))));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Always,
    Never,
    /// Event marker contains at least one of these
    RequiredMarker(MarkerSet),
    /// Event marker contains none of these
    SuppressedMarker(MarkerSet),
    /// MDC value for `key` is present and one of `values`
    RequiredMdc { key: String, values: BTreeSet<String> },
    /// MDC value for `key` is absent or not one of `values`
    SuppressedMdc { key: String, values: BTreeSet<String> },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    /// Placeholder for the parent filter's predicate, resolved by `with_parent`
    Inherit,
}

impl Predicate {
    pub fn required_marker(markers: impl IntoIterator<Item = Marker>) -> Self {
        let markers: MarkerSet = markers.into_iter().collect();
        if markers.is_empty() {
            Predicate::Never
        } else {
            Predicate::RequiredMarker(markers)
        }
    }

    pub fn suppressed_marker(markers: impl IntoIterator<Item = Marker>) -> Self {
        let markers: MarkerSet = markers.into_iter().collect();
        if markers.is_empty() {
            Predicate::Always
        } else {
            Predicate::SuppressedMarker(markers)
        }
    }

    pub fn required_mdc<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            Predicate::Never
        } else {
            Predicate::RequiredMdc {
                key: key.into(),
                values,
            }
        }
    }

    pub fn suppressed_mdc<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            Predicate::Always
        } else {
            Predicate::SuppressedMdc {
                key: key.into(),
                values,
            }
        }
    }

    /// Conjunction of `conditions`, `Always` when empty
    pub fn all_of(conditions: impl IntoIterator<Item = Predicate>) -> Self {
        conditions
            .into_iter()
            .fold(Predicate::Always, |acc, p| acc.and(&p))
    }

    /// Disjunction of `conditions`, `Never` when empty
    pub fn any_of(conditions: impl IntoIterator<Item = Predicate>) -> Self {
        conditions
            .into_iter()
            .fold(Predicate::Never, |acc, p| acc.or(&p))
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Predicate::Always)
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Predicate::Never)
    }

    /// Evaluate without an event, against the current thread's MDC
    ///
    /// Marker requirements cannot be satisfied without a marker, so they
    /// evaluate false here while marker suppressions evaluate true.
    pub fn test(&self) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Never => false,
            Predicate::RequiredMarker(_) => false,
            Predicate::SuppressedMarker(_) => true,
            Predicate::RequiredMdc { key, values } => {
                Mdc::with_value(key, |value| value.is_some_and(|v| values.contains(v)))
            }
            Predicate::SuppressedMdc { key, values } => {
                Mdc::with_value(key, |value| !value.is_some_and(|v| values.contains(v)))
            }
            Predicate::All(conditions) => conditions.iter().all(Predicate::test),
            Predicate::Any(conditions) => conditions.iter().any(Predicate::test),
            Predicate::Inherit => false,
        }
    }

    /// Evaluate for a call carrying `marker`, against the current thread's MDC
    pub fn test_marker(&self, marker: Option<&Marker>) -> bool {
        match self {
            Predicate::RequiredMarker(required) => matches_any(marker, required),
            Predicate::SuppressedMarker(suppressed) => !matches_any(marker, suppressed),
            Predicate::All(conditions) => conditions.iter().all(|p| p.test_marker(marker)),
            Predicate::Any(conditions) => conditions.iter().any(|p| p.test_marker(marker)),
            _ => self.test(),
        }
    }

    /// Evaluate against a constructed event and its MDC snapshot
    pub fn test_event(&self, event: &LogEvent) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Never | Predicate::Inherit => false,
            Predicate::RequiredMarker(required) => matches_any(event.marker.as_ref(), required),
            Predicate::SuppressedMarker(suppressed) => {
                !matches_any(event.marker.as_ref(), suppressed)
            }
            Predicate::RequiredMdc { key, values } => {
                event.mdc_value(key).is_some_and(|v| values.contains(v))
            }
            Predicate::SuppressedMdc { key, values } => {
                !event.mdc_value(key).is_some_and(|v| values.contains(v))
            }
            Predicate::All(conditions) => conditions.iter().all(|p| p.test_event(event)),
            Predicate::Any(conditions) => conditions.iter().any(|p| p.test_event(event)),
        }
    }

    #[must_use]
    pub fn and(&self, other: &Predicate) -> Predicate {
        use Predicate::*;
        match (self, other) {
            (Always, p) | (p, Always) => p.clone(),
            (Never, _) | (_, Never) => Never,
            (a, b) if a == b => a.clone(),
            (RequiredMarker(a), RequiredMarker(b)) => {
                Predicate::required_marker(marker_overlap(a, b))
            }
            (SuppressedMarker(a), SuppressedMarker(b)) => {
                SuppressedMarker(a.union(b).cloned().collect())
            }
            (
                RequiredMdc { key, values: a },
                RequiredMdc {
                    key: other_key,
                    values: b,
                },
            ) if key == other_key => Predicate::required_mdc(key.clone(), a.intersection(b).cloned()),
            (
                SuppressedMdc { key, values: a },
                SuppressedMdc {
                    key: other_key,
                    values: b,
                },
            ) if key == other_key => SuppressedMdc {
                key: key.clone(),
                values: a.union(b).cloned().collect(),
            },
            (All(a), All(b)) => All(a.iter().chain(b.iter()).cloned().collect()),
            (All(a), p) => All(a.iter().cloned().chain(std::iter::once(p.clone())).collect()),
            (p, All(b)) => All(std::iter::once(p.clone()).chain(b.iter().cloned()).collect()),
            (a, b) => All(vec![a.clone(), b.clone()]),
        }
    }

    #[must_use]
    pub fn or(&self, other: &Predicate) -> Predicate {
        use Predicate::*;
        match (self, other) {
            (Always, _) | (_, Always) => Always,
            (Never, p) | (p, Never) => p.clone(),
            (a, b) if a == b => a.clone(),
            (RequiredMarker(a), RequiredMarker(b)) => RequiredMarker(a.union(b).cloned().collect()),
            (
                RequiredMdc { key, values: a },
                RequiredMdc {
                    key: other_key,
                    values: b,
                },
            ) if key == other_key => RequiredMdc {
                key: key.clone(),
                values: a.union(b).cloned().collect(),
            },
            (Any(a), Any(b)) => Any(a.iter().chain(b.iter()).cloned().collect()),
            (Any(a), p) => Any(a.iter().cloned().chain(std::iter::once(p.clone())).collect()),
            (p, Any(b)) => Any(std::iter::once(p.clone()).chain(b.iter().cloned()).collect()),
            (a, b) => Any(vec![a.clone(), b.clone()]),
        }
    }

    /// Logical complement; combinators negate through De Morgan
    ///
    /// Fails for predicates still containing `Inherit`, whose meaning is not
    /// known until the parent filter is applied.
    pub fn negate(&self) -> Result<Predicate> {
        Ok(match self {
            Predicate::Always => Predicate::Never,
            Predicate::Never => Predicate::Always,
            Predicate::RequiredMarker(m) => Predicate::SuppressedMarker(m.clone()),
            Predicate::SuppressedMarker(m) => Predicate::RequiredMarker(m.clone()),
            Predicate::RequiredMdc { key, values } => Predicate::SuppressedMdc {
                key: key.clone(),
                values: values.clone(),
            },
            Predicate::SuppressedMdc { key, values } => Predicate::RequiredMdc {
                key: key.clone(),
                values: values.clone(),
            },
            Predicate::All(conditions) => {
                let mut negated = Predicate::Never;
                for condition in conditions {
                    negated = negated.or(&condition.negate()?);
                }
                negated
            }
            Predicate::Any(conditions) => {
                let mut negated = Predicate::Always;
                for condition in conditions {
                    negated = negated.and(&condition.negate()?);
                }
                negated
            }
            Predicate::Inherit => {
                return Err(LoggerError::irreducible(
                    "an inherited predicate cannot be negated before it is resolved",
                ))
            }
        })
    }

    /// Replace every `Inherit` placeholder with `parent`
    #[must_use]
    pub fn with_parent(&self, parent: &Predicate) -> Predicate {
        match self {
            Predicate::Inherit => parent.clone(),
            Predicate::All(conditions) => conditions
                .iter()
                .fold(Predicate::Always, |acc, p| acc.and(&p.with_parent(parent))),
            Predicate::Any(conditions) => conditions
                .iter()
                .fold(Predicate::Never, |acc, p| acc.or(&p.with_parent(parent))),
            other => other.clone(),
        }
    }

    pub fn contains_inherit(&self) -> bool {
        match self {
            Predicate::Inherit => true,
            Predicate::All(conditions) | Predicate::Any(conditions) => {
                conditions.iter().any(Predicate::contains_inherit)
            }
            _ => false,
        }
    }
}

fn matches_any(marker: Option<&Marker>, candidates: &MarkerSet) -> bool {
    marker.is_some_and(|m| candidates.iter().any(|c| m.contains(c)))
}

/// Markers from either side that imply a marker on the other side
fn marker_overlap(a: &MarkerSet, b: &MarkerSet) -> MarkerSet {
    let from_a = a.iter().filter(|m| b.iter().any(|o| m.contains(o)));
    let from_b = b.iter().filter(|o| a.iter().any(|m| o.contains(m)));
    from_a.chain(from_b).cloned().collect()
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join("|")
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Always => f.write_str("ALWAYS"),
            Predicate::Never => f.write_str("NEVER"),
            Predicate::Inherit => f.write_str("INHERIT"),
            Predicate::RequiredMarker(m) => write!(f, "marker={}", join(m.iter().map(Marker::name))),
            Predicate::SuppressedMarker(m) => {
                write!(f, "marker!={}", join(m.iter().map(Marker::name)))
            }
            Predicate::RequiredMdc { key, values } => {
                write!(f, "mdc:{}={}", key, join(values.iter().map(String::as_str)))
            }
            Predicate::SuppressedMdc { key, values } => {
                write!(f, "mdc:{}!={}", key, join(values.iter().map(String::as_str)))
            }
            Predicate::All(conditions) => {
                let parts: Vec<_> = conditions.iter().map(ToString::to_string).collect();
                write!(f, "all({})", parts.join(" & "))
            }
            Predicate::Any(conditions) => {
                let parts: Vec<_> = conditions.iter().map(ToString::to_string).collect();
                write!(f, "any({})", parts.join(" | "))
            }
        }
    }
}
