//! Destination-side filtering wrappers

use crate::core::observer::null_observer;
use crate::core::{Filter, LogEvent, LogLevel, Marker, Observer, ObserverRef, Predicate, Result};
use std::sync::Arc;

/// Drops events below a fixed level
///
/// Statically disabled levels filter down to the null observer, so the
/// dispatch engine never even builds an event for them.
pub struct LevelThresholdObserver {
    delegate: ObserverRef,
    threshold: LogLevel,
}

impl LevelThresholdObserver {
    pub fn new(delegate: ObserverRef, threshold: LogLevel) -> Self {
        Self { delegate, threshold }
    }

    pub fn threshold(&self) -> LogLevel {
        self.threshold
    }
}

impl Observer for LevelThresholdObserver {
    fn log_event(&self, event: &LogEvent) -> Result<()> {
        if event.level >= self.threshold {
            self.delegate.log_event(event)
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        self.delegate.name()
    }

    fn filtered_on(self: Arc<Self>, level: LogLevel, predicate: &Predicate) -> ObserverRef {
        if level < self.threshold {
            null_observer()
        } else {
            Arc::clone(&self.delegate).filtered_on(level, predicate)
        }
    }

    fn is_enabled(&self) -> bool {
        self.delegate.is_enabled()
    }

    fn is_enabled_for(&self, marker: Option<&Marker>) -> bool {
        self.delegate.is_enabled_for(marker)
    }

    fn flush(&self) -> Result<()> {
        self.delegate.flush()
    }
}

/// Applies a per-level filter and an extra condition in front of a destination
///
/// # Example
///
/// ```
/// use rust_logevents::observers::{BufferObserver, FilteredObserver};
/// use rust_logevents::{Filter, LogLevel, Observer, Predicate};
/// use std::sync::Arc;
///
/// let buffer = Arc::new(BufferObserver::new());
/// let filtered = Arc::new(FilteredObserver::new(
///     buffer.clone(),
///     Filter::at_level(LogLevel::Warn),
///     Predicate::Always,
/// ));
/// assert!(filtered.filtered_on(LogLevel::Info, &Predicate::Always).is_null());
/// ```
pub struct FilteredObserver {
    delegate: ObserverRef,
    filter: Filter,
    condition: Predicate,
}

impl FilteredObserver {
    /// `Inherit` entries in `filter` are treated as `Always`
    pub fn new(delegate: ObserverRef, filter: Filter, condition: Predicate) -> Self {
        Self {
            delegate,
            filter: filter.with_parent(&Filter::uniform(Predicate::Always)),
            condition,
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn condition(&self) -> &Predicate {
        &self.condition
    }

    fn predicate_for(&self, level: LogLevel) -> Predicate {
        self.filter.predicate(level).and(&self.condition)
    }
}

impl Observer for FilteredObserver {
    fn log_event(&self, event: &LogEvent) -> Result<()> {
        if self.predicate_for(event.level).test_event(event) {
            self.delegate.log_event(event)
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        self.delegate.name()
    }

    fn filtered_on(self: Arc<Self>, level: LogLevel, predicate: &Predicate) -> ObserverRef {
        Arc::clone(&self.delegate).filtered_on(level, &self.predicate_for(level).and(predicate))
    }

    fn is_enabled(&self) -> bool {
        self.delegate.is_enabled()
    }

    fn is_enabled_for(&self, marker: Option<&Marker>) -> bool {
        self.delegate.is_enabled_for(marker)
    }

    fn flush(&self) -> Result<()> {
        self.delegate.flush()
    }
}
