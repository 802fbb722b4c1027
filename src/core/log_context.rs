//! Event arguments and the mapped diagnostic context (MDC)
//!
//! This module provides:
//! - `FieldValue`: positional argument values carried by a `LogEvent`
//! - `Mdc`: thread-scoped key/value context copied into every event
//! - `MdcGuard`: RAII guard restoring the previous MDC value

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Value type for message arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

impl FieldValue {
    /// Convert to serde_json::Value for JSON serialization
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
            FieldValue::Int(i) => serde_json::Value::Number((*i).into()),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Null => serde_json::Value::Null,
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i as i64)
    }
}

impl From<u32> for FieldValue {
    fn from(i: u32) -> Self {
        FieldValue::Int(i as i64)
    }
}

impl From<usize> for FieldValue {
    fn from(i: usize) -> Self {
        FieldValue::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Immutable copy of an MDC taken when an event is created
pub type MdcSnapshot = Arc<BTreeMap<String, String>>;

thread_local! {
    // Copy-on-write so that unchanged contexts share one snapshot between events.
    static MDC: RefCell<MdcSnapshot> = RefCell::new(Arc::new(BTreeMap::new()));
}

/// Mapped diagnostic context for the current thread
///
/// # Example
///
/// ```
/// use rust_logevents::Mdc;
///
/// {
///     let _user = Mdc::put("user", "admin");
///     assert_eq!(Mdc::get("user").as_deref(), Some("admin"));
/// }
/// assert_eq!(Mdc::get("user"), None);
/// ```
pub struct Mdc;

impl Mdc {
    /// Set `key` for the current thread; the guard restores the previous value
    #[must_use = "dropping the guard immediately restores the previous value"]
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> MdcGuard {
        let key = key.into();
        let previous = Self::insert(key.clone(), value.into());
        MdcGuard { key, previous }
    }

    /// Set `key` without a scope guard
    pub fn insert(key: String, value: String) -> Option<String> {
        MDC.with(|mdc| Arc::make_mut(&mut mdc.borrow_mut()).insert(key, value))
    }

    pub fn get(key: &str) -> Option<String> {
        Self::with_value(key, |value| value.map(str::to_string))
    }

    /// Inspect a value without copying it
    pub fn with_value<R>(key: &str, f: impl FnOnce(Option<&str>) -> R) -> R {
        MDC.with(|mdc| f(mdc.borrow().get(key).map(String::as_str)))
    }

    pub fn remove(key: &str) -> Option<String> {
        MDC.with(|mdc| {
            let mut mdc = mdc.borrow_mut();
            if mdc.contains_key(key) {
                Arc::make_mut(&mut mdc).remove(key)
            } else {
                None
            }
        })
    }

    pub fn clear() {
        MDC.with(|mdc| *mdc.borrow_mut() = Arc::new(BTreeMap::new()));
    }

    pub fn snapshot() -> MdcSnapshot {
        MDC.with(|mdc| Arc::clone(&mdc.borrow()))
    }
}

/// RAII guard for a scoped MDC entry
pub struct MdcGuard {
    key: String,
    previous: Option<String>,
}

impl Drop for MdcGuard {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => {
                Mdc::insert(std::mem::take(&mut self.key), previous);
            }
            None => {
                Mdc::remove(&self.key);
            }
        }
    }
}
