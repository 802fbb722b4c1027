//! Internal diagnostics channel
//!
//! Failures inside the runtime (broken destinations, rejected reloads, batch
//! processor errors) are never thrown back to the logging call. They are
//! recorded here, and echoed to stderr when at or above the threshold.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Number of earliest messages retained verbatim
pub const HEAD_CAPACITY: usize = 1000;

/// Number of most recent messages retained after the head is full
pub const TAIL_CAPACITY: usize = 200;

/// Environment variable selecting the echo threshold of the global channel
pub const STATUS_THRESHOLD_ENV: &str = "LOGEVENTS_STATUS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusLevel {
    Trace = 0,
    Debug = 1,
    Config = 2,
    Info = 3,
    Error = 4,
    Fatal = 5,
}

impl StatusLevel {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StatusLevel::Trace,
            1 => StatusLevel::Debug,
            2 => StatusLevel::Config,
            3 => StatusLevel::Info,
            4 => StatusLevel::Error,
            _ => StatusLevel::Fatal,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            StatusLevel::Trace => "TRACE",
            StatusLevel::Debug => "DEBUG",
            StatusLevel::Config => "CONFIG",
            StatusLevel::Info => "INFO",
            StatusLevel::Error => "ERROR",
            StatusLevel::Fatal => "CRITICAL",
        }
    }
}

impl FromStr for StatusLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TRACE" => Ok(StatusLevel::Trace),
            "DEBUG" => Ok(StatusLevel::Debug),
            "CONFIG" => Ok(StatusLevel::Config),
            "INFO" => Ok(StatusLevel::Info),
            "ERROR" => Ok(StatusLevel::Error),
            "FATAL" | "CRITICAL" => Ok(StatusLevel::Fatal),
            _ => Err(format!("Invalid status level: '{}'", s)),
        }
    }
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub level: StatusLevel,
    pub location: String,
    pub message: String,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[LOGGER {}] {}: {}", self.level, self.location, self.message)?;
        if let Some(ref error) = self.error {
            write!(f, " ({})", error)?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct StatusBuffer {
    head: Vec<StatusEvent>,
    tail: VecDeque<StatusEvent>,
}

/// Append-only sink for runtime self-diagnostics
pub struct StatusChannel {
    buffer: Mutex<StatusBuffer>,
    threshold: AtomicU8,
}

static GLOBAL: Lazy<StatusChannel> = Lazy::new(|| {
    let threshold = std::env::var(STATUS_THRESHOLD_ENV)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(StatusLevel::Info);
    StatusChannel::with_threshold(threshold)
});

impl StatusChannel {
    pub fn new() -> Self {
        Self::with_threshold(StatusLevel::Info)
    }

    pub fn with_threshold(threshold: StatusLevel) -> Self {
        Self {
            buffer: Mutex::new(StatusBuffer::default()),
            threshold: AtomicU8::new(threshold as u8),
        }
    }

    /// The process-wide channel the runtime reports to
    pub fn global() -> &'static StatusChannel {
        &GLOBAL
    }

    pub fn threshold(&self) -> StatusLevel {
        StatusLevel::from_u8(self.threshold.load(Ordering::Relaxed))
    }

    pub fn set_threshold(&self, threshold: StatusLevel) {
        self.threshold.store(threshold as u8, Ordering::Relaxed);
    }

    pub fn add(
        &self,
        level: StatusLevel,
        location: impl Into<String>,
        message: impl Into<String>,
        error: Option<&dyn std::error::Error>,
    ) {
        let event = StatusEvent {
            level,
            location: location.into(),
            message: message.into(),
            error: error.map(|e| e.to_string()),
            timestamp: Utc::now(),
        };
        if level >= self.threshold() {
            eprintln!("{}", event);
        }

        let mut buffer = self.buffer.lock();
        if buffer.head.len() < HEAD_CAPACITY {
            buffer.head.push(event);
        } else {
            if buffer.tail.len() >= TAIL_CAPACITY {
                buffer.tail.pop_front();
            }
            buffer.tail.push_back(event);
        }
    }

    pub fn add_fatal(
        &self,
        location: impl Into<String>,
        message: impl Into<String>,
        error: Option<&dyn std::error::Error>,
    ) {
        self.add(StatusLevel::Fatal, location, message, error);
    }

    pub fn add_error(
        &self,
        location: impl Into<String>,
        message: impl Into<String>,
        error: Option<&dyn std::error::Error>,
    ) {
        self.add(StatusLevel::Error, location, message, error);
    }

    pub fn add_info(&self, location: impl Into<String>, message: impl Into<String>) {
        self.add(StatusLevel::Info, location, message, None);
    }

    pub fn add_config(&self, location: impl Into<String>, message: impl Into<String>) {
        self.add(StatusLevel::Config, location, message, None);
    }

    pub fn add_debug(&self, location: impl Into<String>, message: impl Into<String>) {
        self.add(StatusLevel::Debug, location, message, None);
    }

    pub fn add_trace(&self, location: impl Into<String>, message: impl Into<String>) {
        self.add(StatusLevel::Trace, location, message, None);
    }

    /// Every retained message, head first
    pub fn messages(&self) -> Vec<StatusEvent> {
        let buffer = self.buffer.lock();
        buffer.head.iter().chain(buffer.tail.iter()).cloned().collect()
    }

    pub fn messages_at_least(&self, level: StatusLevel) -> Vec<StatusEvent> {
        let buffer = self.buffer.lock();
        buffer
            .head
            .iter()
            .chain(buffer.tail.iter())
            .filter(|e| e.level >= level)
            .cloned()
            .collect()
    }

    /// Messages reported from one location, e.g. a single observer
    pub fn messages_for(&self, location: &str) -> Vec<StatusEvent> {
        let buffer = self.buffer.lock();
        buffer
            .head
            .iter()
            .chain(buffer.tail.iter())
            .filter(|e| e.location == location)
            .cloned()
            .collect()
    }

    pub fn last_message(&self) -> Option<StatusEvent> {
        let buffer = self.buffer.lock();
        buffer.tail.back().or_else(|| buffer.head.last()).cloned()
    }

    pub fn clear(&self) {
        let mut buffer = self.buffer.lock();
        buffer.head.clear();
        buffer.tail.clear();
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract a readable message from a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> StatusChannel {
        StatusChannel::with_threshold(StatusLevel::Fatal)
    }

    #[test]
    fn test_messages_are_retained_in_order() {
        let status = quiet();
        status.add_info("hierarchy", "configured");
        status.add_debug("hierarchy", "refreshed 3 loggers");

        let messages = status.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message, "configured");
        assert_eq!(status.last_message().unwrap().message, "refreshed 3 loggers");
    }

    #[test]
    fn test_head_and_tail_capacity() {
        let status = quiet();
        for i in 0..(HEAD_CAPACITY + TAIL_CAPACITY + 50) {
            status.add_trace("loop", format!("message {}", i));
        }

        let messages = status.messages();
        assert_eq!(messages.len(), HEAD_CAPACITY + TAIL_CAPACITY);
        assert_eq!(messages[0].message, "message 0");
        assert_eq!(
            status.last_message().unwrap().message,
            format!("message {}", HEAD_CAPACITY + TAIL_CAPACITY + 49)
        );
    }

    #[test]
    fn test_filter_by_level_and_location() {
        let status = quiet();
        status.add_config("a", "x");
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        status.add_error("b", "write failed", Some(&err));

        let errors = status.messages_at_least(StatusLevel::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error.as_deref(), Some("boom"));
        assert_eq!(status.messages_for("a").len(), 1);

        status.clear();
        assert!(status.messages().is_empty());
    }

    #[test]
    fn test_display_uses_logger_tag() {
        let status = quiet();
        status.add_fatal("config", "Unknown observer 'x'", None);
        let line = status.last_message().unwrap().to_string();
        assert_eq!(line, "[LOGGER CRITICAL] config: Unknown observer 'x'");
    }

    #[test]
    fn test_status_level_parse() {
        assert_eq!("config".parse::<StatusLevel>().unwrap(), StatusLevel::Config);
        assert!("loud".parse::<StatusLevel>().is_err());
    }
}
