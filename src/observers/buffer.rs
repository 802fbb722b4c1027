//! In-memory destination

use crate::core::{LogEvent, Observer, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Keeps received events in memory, oldest evicted beyond the capacity
#[derive(Debug, Default)]
pub struct BufferObserver {
    events: Mutex<VecDeque<LogEvent>>,
    capacity: Option<usize>,
}

impl BufferObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: Some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Received events in arrival order
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Formatted messages in arrival order
    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(LogEvent::formatted_message)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Observer for BufferObserver {
    fn log_event(&self, event: &LogEvent) -> Result<()> {
        let mut events = self.events.lock();
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                return Ok(());
            }
            while events.len() >= capacity {
                events.pop_front();
            }
        }
        events.push_back(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "buffer"
    }
}
