//! Log event structure

use super::log_context::{FieldValue, Mdc, MdcSnapshot};
use super::log_level::LogLevel;
use super::marker::Marker;
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::sync::Arc;

// Thread-local cache for the thread label to avoid repeated allocations
thread_local! {
    static THREAD_LABEL_CACHE: RefCell<Option<Arc<str>>> = const { RefCell::new(None) };
}

/// Thread name, or its id when unnamed, computed once per thread
fn current_thread_label() -> Arc<str> {
    THREAD_LABEL_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        match cache.as_ref() {
            Some(label) => Arc::clone(label),
            None => {
                let thread = std::thread::current();
                let label: Arc<str> = match thread.name() {
                    Some(name) => Arc::from(name),
                    None => Arc::from(format!("{:?}", thread.id())),
                };
                *cache = Some(Arc::clone(&label));
                label
            }
        }
    })
}

/// Source location captured at the logging call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
    pub module_path: &'static str,
}

/// Description of an error attached to an event, with its `source()` chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub message: String,
    pub causes: Vec<String>,
}

impl ErrorInfo {
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: error.to_string(),
            causes,
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", LogEvent::sanitize_message(&self.message))?;
        for cause in &self.causes {
            write!(f, ": caused by {}", LogEvent::sanitize_message(cause))?;
        }
        Ok(())
    }
}

/// A single log call that passed its enablement check
///
/// Events are never mutated after construction and may be shared between
/// several observers. Equality deliberately ignores arguments, error and MDC.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub logger: Arc<str>,
    pub level: LogLevel,
    pub marker: Option<Marker>,
    pub template: String,
    pub args: Vec<FieldValue>,
    pub error: Option<ErrorInfo>,
    pub thread: Arc<str>,
    pub timestamp: DateTime<Utc>,
    pub mdc: MdcSnapshot,
    pub call_site: Option<CallSite>,
    /// Format string a pre-rendered message came from
    pub pattern: Option<&'static str>,
}

impl LogEvent {
    /// Sanitize log message to prevent log injection attacks
    ///
    /// Replaces newlines, carriage returns, and tabs with escape sequences
    /// to prevent attackers from injecting fake log entries.
    fn sanitize_message(message: &str) -> String {
        message
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t")
    }

    /// Create an event stamped with the current time, thread and MDC
    pub fn new(logger: Arc<str>, level: LogLevel, template: impl Into<String>) -> Self {
        Self {
            logger,
            level,
            marker: None,
            template: template.into(),
            args: Vec::new(),
            error: None,
            thread: current_thread_label(),
            timestamp: Utc::now(),
            mdc: Mdc::snapshot(),
            call_site: None,
            pattern: None,
        }
    }

    #[must_use]
    pub fn with_marker(mut self, marker: Option<Marker>) -> Self {
        self.marker = marker;
        self
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<FieldValue>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: Option<ErrorInfo>) -> Self {
        self.error = error;
        self
    }

    #[must_use]
    pub fn with_call_site(mut self, call_site: Option<CallSite>) -> Self {
        self.call_site = call_site;
        self
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: Option<&'static str>) -> Self {
        self.pattern = pattern;
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_mdc(mut self, mdc: MdcSnapshot) -> Self {
        self.mdc = mdc;
        self
    }

    /// Template with `{}` placeholders replaced by the arguments, sanitized
    ///
    /// Surplus placeholders are kept verbatim; surplus arguments are ignored.
    pub fn formatted_message(&self) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut args = self.args.iter();
        let mut rest = self.template.as_str();
        while let Some(pos) = rest.find("{}") {
            out.push_str(&rest[..pos]);
            match args.next() {
                Some(arg) => out.push_str(&arg.to_string()),
                None => out.push_str("{}"),
            }
            rest = &rest[pos + 2..];
        }
        out.push_str(rest);
        Self::sanitize_message(&out)
    }

    /// Format string when known, otherwise the template
    pub fn message_pattern(&self) -> &str {
        self.pattern.unwrap_or(&self.template)
    }

    /// Whether `other` continues a run of identical messages
    pub fn is_same_message(&self, other: &LogEvent) -> bool {
        self.level == other.level
            && self.logger == other.logger
            && self.message_pattern() == other.message_pattern()
    }

    pub fn mdc_value(&self, key: &str) -> Option<&str> {
        self.mdc.get(key).map(String::as_str)
    }
}

impl PartialEq for LogEvent {
    fn eq(&self, other: &Self) -> bool {
        self.logger == other.logger
            && self.level == other.level
            && self.marker == other.marker
            && self.template == other.template
            && self.thread == other.thread
            && self.timestamp == other.timestamp
    }
}

impl Eq for LogEvent {}
