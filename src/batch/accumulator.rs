//! Batches of events grouped by consecutive duplicate messages

use crate::core::LogEvent;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::mem;

/// A run of consecutive events with the same logger, level and template
///
/// Only the first event of the run is kept; repeats bump the count and the
/// latest timestamp.
#[derive(Debug, Clone)]
pub struct LogEventGroup {
    head: LogEvent,
    count: usize,
    latest: DateTime<Utc>,
}

impl LogEventGroup {
    fn new(head: LogEvent) -> Self {
        let latest = head.timestamp;
        Self {
            head,
            count: 1,
            latest,
        }
    }

    /// First event of the run, used for message and argument display
    pub fn head(&self) -> &LogEvent {
        &self.head
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn first_event_time(&self) -> DateTime<Utc> {
        self.head.timestamp
    }

    pub fn latest_event_time(&self) -> DateTime<Utc> {
        self.latest
    }
}

/// Events collected between two flushes
#[derive(Debug, Clone, Default)]
pub struct LogEventBatch {
    groups: Vec<LogEventGroup>,
}

impl LogEventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `event`, extending the last group when it repeats its message
    pub fn add(&mut self, event: LogEvent) {
        if let Some(last) = self.groups.last_mut() {
            if last.head.is_same_message(&event) {
                last.count += 1;
                last.latest = event.timestamp;
                return;
            }
        }
        self.groups.push(LogEventGroup::new(event));
    }

    pub fn groups(&self) -> &[LogEventGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Number of events across all groups
    pub fn event_count(&self) -> usize {
        self.groups.iter().map(LogEventGroup::count).sum()
    }

    /// `None` for an empty batch
    pub fn first_event_time(&self) -> Option<DateTime<Utc>> {
        self.groups.first().map(LogEventGroup::first_event_time)
    }

    pub fn latest_event_time(&self) -> Option<DateTime<Utc>> {
        self.groups.last().map(LogEventGroup::latest_event_time)
    }
}

impl<'a> IntoIterator for &'a LogEventBatch {
    type Item = &'a LogEventGroup;
    type IntoIter = std::slice::Iter<'a, LogEventGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

/// Thread-safe holder of the open batch
#[derive(Debug, Default)]
pub struct BatchAccumulator {
    current: Mutex<LogEventBatch>,
}

impl BatchAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `event`, returning true when it opened a new batch
    pub fn add(&self, event: LogEvent) -> bool {
        let mut current = self.current.lock();
        let opened = current.is_empty();
        current.add(event);
        opened
    }

    /// Swap the open batch for an empty one and return it
    pub fn take(&self) -> LogEventBatch {
        mem::take(&mut *self.current.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.current.lock().is_empty()
    }

    pub fn event_count(&self) -> usize {
        self.current.lock().event_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;
    use chrono::Duration;
    use std::sync::Arc;

    fn event(logger: &str, level: LogLevel, template: &str) -> LogEvent {
        LogEvent::new(Arc::from(logger), level, template)
    }

    #[test]
    fn test_consecutive_duplicates_are_grouped() {
        let mut batch = LogEventBatch::new();
        let start = Utc::now();
        for i in 0..3 {
            batch.add(
                event("db", LogLevel::Warn, "pool exhausted")
                    .with_timestamp(start + Duration::seconds(i)),
            );
        }

        assert_eq!(batch.len(), 1);
        let group = &batch.groups()[0];
        assert_eq!(group.count(), 3);
        assert_eq!(group.first_event_time(), start);
        assert_eq!(group.latest_event_time(), start + Duration::seconds(2));
        assert_eq!(batch.latest_event_time(), Some(start + Duration::seconds(2)));
    }

    #[test]
    fn test_interleaved_messages_start_new_groups() {
        let mut batch = LogEventBatch::new();
        batch.add(event("db", LogLevel::Warn, "a"));
        batch.add(event("db", LogLevel::Warn, "b"));
        batch.add(event("db", LogLevel::Warn, "a"));
        batch.add(event("db", LogLevel::Error, "a"));
        batch.add(event("web", LogLevel::Error, "a"));

        assert_eq!(batch.len(), 5);
        assert_eq!(batch.event_count(), 5);
    }

    #[test]
    fn test_head_keeps_first_arguments() {
        let mut batch = LogEventBatch::new();
        batch.add(event("db", LogLevel::Info, "user {}").with_args(vec!["alice".into()]));
        batch.add(event("db", LogLevel::Info, "user {}").with_args(vec!["bob".into()]));

        let group = &batch.groups()[0];
        assert_eq!(group.count(), 2);
        assert_eq!(group.head().formatted_message(), "user alice");
    }

    #[test]
    fn test_take_swaps_in_empty_batch() {
        let accumulator = BatchAccumulator::new();
        assert!(accumulator.add(event("db", LogLevel::Info, "first")));
        assert!(!accumulator.add(event("db", LogLevel::Info, "second")));

        let taken = accumulator.take();
        assert_eq!(taken.event_count(), 2);
        assert!(accumulator.is_empty());
        assert!(accumulator.take().first_event_time().is_none());
        assert!(accumulator.add(event("db", LogLevel::Info, "third")));
    }
}
