//! Per-(logger, level) event emitters
//!
//! Each logger holds one `EventGenerator` per level, rebuilt whenever its
//! configuration changes. The disabled case is a unit variant, so checking
//! it costs one branch and logging through it allocates nothing.

use super::log_context::FieldValue;
use super::log_event::{CallSite, ErrorInfo, LogEvent};
use super::log_level::LogLevel;
use super::marker::Marker;
use super::metrics::LoggerMetrics;
use super::observer::ObserverRef;
use super::predicate::Predicate;
use super::status::{panic_message, StatusChannel};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

#[derive(Clone, Default)]
pub enum EventGenerator {
    #[default]
    Null,
    Live(LiveGenerator),
}

/// Emitter bound to an already filtered observer chain
#[derive(Clone)]
pub struct LiveGenerator {
    logger: Arc<str>,
    level: LogLevel,
    observer: ObserverRef,
    metrics: Arc<LoggerMetrics>,
}

impl EventGenerator {
    /// Build the emitter for `level` events of `logger`
    ///
    /// The observer is filtered on `predicate` here, once, so that
    /// individual calls only evaluate what remains.
    pub fn create(
        logger: Arc<str>,
        level: LogLevel,
        observer: &ObserverRef,
        predicate: &Predicate,
        metrics: Arc<LoggerMetrics>,
    ) -> Self {
        if observer.is_null() || predicate.is_never() {
            return EventGenerator::Null;
        }
        let observer = Arc::clone(observer).filtered_on(level, predicate);
        if observer.is_null() {
            return EventGenerator::Null;
        }
        EventGenerator::Live(LiveGenerator {
            logger,
            level,
            observer,
            metrics,
        })
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        match self {
            EventGenerator::Null => false,
            EventGenerator::Live(live) => live.observer.is_enabled(),
        }
    }

    #[inline]
    pub fn is_enabled_for(&self, marker: Option<&Marker>) -> bool {
        match self {
            EventGenerator::Null => false,
            EventGenerator::Live(live) => live.observer.is_enabled_for(marker),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, EventGenerator::Null)
    }

    /// The observer chain events are delivered to, if any
    pub fn observer(&self) -> Option<&ObserverRef> {
        match self {
            EventGenerator::Null => None,
            EventGenerator::Live(live) => Some(&live.observer),
        }
    }

    /// Log a plain message
    #[inline]
    pub fn log(&self, message: impl Into<String>) {
        if let EventGenerator::Live(live) = self {
            if live.observer.is_enabled() {
                live.dispatch(LogEvent::new(Arc::clone(&live.logger), live.level, message));
            }
        }
    }

    pub fn log_with_marker(&self, marker: &Marker, message: impl Into<String>) {
        if let EventGenerator::Live(live) = self {
            if live.observer.is_enabled_for(Some(marker)) {
                live.dispatch(
                    LogEvent::new(Arc::clone(&live.logger), live.level, message)
                        .with_marker(Some(marker.clone())),
                );
            }
        }
    }

    /// Start a fluent event for this level
    pub fn event(&self) -> EventBuilder {
        EventBuilder {
            generator: match self {
                EventGenerator::Null => None,
                EventGenerator::Live(live) => Some(live.clone()),
            },
            marker: None,
            args: Vec::new(),
            error: None,
            call_site: None,
            pattern: None,
        }
    }
}

impl LiveGenerator {
    fn dispatch(&self, event: LogEvent) {
        self.metrics.record_dispatched();
        let result = catch_unwind(AssertUnwindSafe(|| self.observer.log_event(&event)));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.metrics.record_failure();
                StatusChannel::global().add_error(
                    self.observer.name(),
                    format!("Failed to deliver {} event from {}", self.level, self.logger),
                    Some(&e),
                );
            }
            Err(panic_info) => {
                self.metrics.record_failure();
                StatusChannel::global().add_fatal(
                    self.observer.name(),
                    format!(
                        "Observer panicked while logging from {}: {}",
                        self.logger,
                        panic_message(&*panic_info)
                    ),
                    None,
                );
            }
        }
    }
}

/// Fluent builder for one log call
///
/// Arguments and the error are only retained when the level is live; the
/// enablement check runs with the final marker when `log` is called.
#[must_use = "an event is only emitted by calling log()"]
pub struct EventBuilder {
    generator: Option<LiveGenerator>,
    marker: Option<Marker>,
    args: Vec<FieldValue>,
    error: Option<ErrorInfo>,
    call_site: Option<CallSite>,
    pattern: Option<&'static str>,
}

impl EventBuilder {
    pub fn marker(mut self, marker: &Marker) -> Self {
        if self.generator.is_some() {
            self.marker = Some(marker.clone());
        }
        self
    }

    pub fn arg(mut self, value: impl Into<FieldValue>) -> Self {
        if self.generator.is_some() {
            self.args.push(value.into());
        }
        self
    }

    pub fn error(mut self, error: &(dyn std::error::Error + 'static)) -> Self {
        if self.generator.is_some() {
            self.error = Some(ErrorInfo::from_error(error));
        }
        self
    }

    pub fn call_site(mut self, call_site: CallSite) -> Self {
        self.call_site = Some(call_site);
        self
    }

    /// Format string the logged message was rendered from
    ///
    /// Events rendered from the same pattern group together in batches.
    pub fn pattern(mut self, pattern: &'static str) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.generator
            .as_ref()
            .is_some_and(|live| live.observer.is_enabled_for(self.marker.as_ref()))
    }

    pub fn log(self, template: impl Into<String>) {
        let Some(live) = self.generator.as_ref() else {
            return;
        };
        if !live.observer.is_enabled_for(self.marker.as_ref()) {
            return;
        }
        let event = LogEvent::new(Arc::clone(&live.logger), live.level, template)
            .with_marker(self.marker)
            .with_args(self.args)
            .with_error(self.error)
            .with_call_site(self.call_site)
            .with_pattern(self.pattern);
        live.dispatch(event);
    }
}
