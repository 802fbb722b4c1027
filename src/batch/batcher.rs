//! Accumulator plus timing policy plus timer

use super::accumulator::{BatchAccumulator, LogEventBatch};
use super::policy::{BatchPolicy, ThrottleState};
use super::scheduler::{FlushAction, FlushTimer, Scheduler};
use crate::core::metrics::BatchMetrics;
use crate::core::status::{panic_message, StatusChannel};
use crate::core::{LogEvent, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Consumer of flushed batches
///
/// Runs on a flush worker, never on the logging thread. Errors are reported
/// to the status channel; the batch is not retried.
pub trait BatchProcessor: Send + Sync + 'static {
    fn process_batch(&self, batch: &LogEventBatch) -> Result<()>;
}

impl<F> BatchProcessor for F
where
    F: Fn(&LogEventBatch) -> Result<()> + Send + Sync + 'static,
{
    fn process_batch(&self, batch: &LogEventBatch) -> Result<()> {
        self(batch)
    }
}

#[derive(Default)]
struct BatcherState {
    first_event: Option<Instant>,
    latest_event: Option<Instant>,
    last_flush: Option<Instant>,
    throttle: ThrottleState,
    pending: bool,
}

/// One accumulator flushed according to one policy
pub struct Batcher {
    name: String,
    policy: BatchPolicy,
    accumulator: BatchAccumulator,
    state: Mutex<BatcherState>,
    // Held across take-and-process so one accumulator never flushes twice at once
    flush_lock: Mutex<()>,
    timer: Box<dyn FlushTimer>,
    _action: FlushAction,
    processor: Arc<dyn BatchProcessor>,
    metrics: Arc<BatchMetrics>,
}

impl Batcher {
    pub fn new(
        name: impl Into<String>,
        policy: BatchPolicy,
        scheduler: &dyn Scheduler,
        processor: Arc<dyn BatchProcessor>,
        metrics: Arc<BatchMetrics>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Batcher>| {
            let this = this.clone();
            let action: FlushAction = Arc::new(move || {
                if let Some(batcher) = this.upgrade() {
                    batcher.flush_at(Instant::now());
                }
            });
            let timer = scheduler.create_timer(Arc::downgrade(&action));
            Batcher {
                name: name.into(),
                policy,
                accumulator: BatchAccumulator::new(),
                state: Mutex::new(BatcherState::default()),
                flush_lock: Mutex::new(()),
                timer,
                _action: action,
                processor,
                metrics,
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &BatchPolicy {
        &self.policy
    }

    pub fn pending_events(&self) -> usize {
        self.accumulator.event_count()
    }

    pub fn add(&self, event: LogEvent) {
        self.add_at(event, Instant::now());
    }

    /// Add `event` with an explicit clock reading and (re)arm the timer
    pub fn add_at(&self, event: LogEvent, now: Instant) {
        let mut state = self.state.lock();
        self.accumulator.add(event);
        self.metrics.record_accepted();
        state.latest_event = Some(now);
        let first_event = *state.first_event.get_or_insert(now);

        let flush_at = match &self.policy {
            BatchPolicy::Cooldown(policy) => {
                Some(policy.next_flush_time(first_event, now, state.last_flush))
            }
            BatchPolicy::Throttle(_) if state.pending => None,
            BatchPolicy::Throttle(policy) => Some(policy.schedule(&mut state.throttle, now)),
        };
        if let Some(flush_at) = flush_at {
            state.pending = true;
            self.timer.schedule(flush_at.saturating_duration_since(now));
        }
    }

    /// Flush the open batch now; returns false when it was empty
    pub fn flush(&self) -> bool {
        self.flush_at(Instant::now())
    }

    pub fn flush_at(&self, now: Instant) -> bool {
        let _flushing = self.flush_lock.lock();
        let batch = {
            let mut state = self.state.lock();
            state.pending = false;
            let batch = self.accumulator.take();
            if batch.is_empty() {
                return false;
            }
            state.first_event = None;
            state.latest_event = None;
            state.last_flush = Some(now);
            if let BatchPolicy::Throttle(policy) = &self.policy {
                policy.flushed(&mut state.throttle, now);
            }
            batch
        };
        self.process(&batch);
        true
    }

    fn process(&self, batch: &LogEventBatch) {
        self.metrics.record_flushed();
        match catch_unwind(AssertUnwindSafe(|| self.processor.process_batch(batch))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.metrics.record_processor_failure();
                StatusChannel::global().add_error(
                    self.name.as_str(),
                    format!("Failed to process batch of {} events", batch.event_count()),
                    Some(&e),
                );
            }
            Err(panic_info) => {
                self.metrics.record_processor_failure();
                StatusChannel::global().add_fatal(
                    self.name.as_str(),
                    format!("Batch processor panicked: {}", panic_message(&*panic_info)),
                    None,
                );
            }
        }
    }
}

/// Batchers partitioned by the value of one MDC key
pub struct MdcBatcher {
    name: String,
    key: String,
    policy: BatchPolicy,
    scheduler: Arc<dyn Scheduler>,
    processor: Arc<dyn BatchProcessor>,
    metrics: Arc<BatchMetrics>,
    partitions: Mutex<HashMap<Option<String>, Arc<Batcher>>>,
}

impl MdcBatcher {
    pub fn new(
        name: impl Into<String>,
        key: impl Into<String>,
        policy: BatchPolicy,
        scheduler: Arc<dyn Scheduler>,
        processor: Arc<dyn BatchProcessor>,
        metrics: Arc<BatchMetrics>,
    ) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            policy,
            scheduler,
            processor,
            metrics,
            partitions: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Batcher for the partition `value`, created on first use
    pub fn partition(&self, value: Option<&str>) -> Arc<Batcher> {
        let mut partitions = self.partitions.lock();
        let batcher = partitions.entry(value.map(str::to_string)).or_insert_with(|| {
            let name = match value {
                Some(value) => format!("{}[{}={}]", self.name, self.key, value),
                None => format!("{}[{}]", self.name, self.key),
            };
            Batcher::new(
                name,
                self.policy.clone(),
                self.scheduler.as_ref(),
                Arc::clone(&self.processor),
                Arc::clone(&self.metrics),
            )
        });
        Arc::clone(batcher)
    }

    /// Every partition created so far
    pub fn batchers(&self) -> Vec<Arc<Batcher>> {
        self.partitions.lock().values().cloned().collect()
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.lock().len()
    }

    pub fn add_at(&self, event: LogEvent, now: Instant) {
        let batcher = self.partition(event.mdc_value(&self.key));
        batcher.add_at(event, now);
    }

    pub fn flush_at(&self, now: Instant) -> usize {
        self.batchers().iter().filter(|b| b.flush_at(now)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::policy::{CooldownPolicy, ThrottlePolicy};
    use crate::batch::scheduler::ManualScheduler;
    use crate::core::{LogLevel, LoggerError};
    use std::time::Duration;

    type Seen = Arc<Mutex<Vec<(String, usize)>>>;

    fn recording_processor() -> (Arc<dyn BatchProcessor>, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let processor = move |batch: &LogEventBatch| -> Result<()> {
            for group in batch {
                sink.lock().push((group.head().formatted_message(), group.count()));
            }
            Ok(())
        };
        (Arc::new(processor), seen)
    }

    fn event(template: &str) -> LogEvent {
        LogEvent::new(Arc::from("batch.test"), LogLevel::Warn, template)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_cooldown_debounces_timer() {
        let scheduler = ManualScheduler::new();
        let (processor, seen) = recording_processor();
        let batcher = Batcher::new(
            "cooldown",
            BatchPolicy::Cooldown(CooldownPolicy::new(secs(2), secs(10), secs(30))),
            &scheduler,
            processor,
            Arc::new(BatchMetrics::new()),
        );

        let t0 = Instant::now();
        batcher.add_at(event("disk full"), t0);
        batcher.add_at(event("disk full"), t0 + secs(1));
        assert_eq!(scheduler.requested_delays(), vec![secs(2), secs(2)]);
        assert_eq!(scheduler.pending(), 1);

        assert_eq!(scheduler.fire_all(), 1);
        assert_eq!(*seen.lock(), vec![("disk full".to_string(), 2)]);
        assert_eq!(batcher.pending_events(), 0);
    }

    #[test]
    fn test_cooldown_spacing_after_flush() {
        let scheduler = ManualScheduler::new();
        let (processor, _) = recording_processor();
        let batcher = Batcher::new(
            "cooldown",
            BatchPolicy::Cooldown(CooldownPolicy::new(secs(2), secs(10), secs(30))),
            &scheduler,
            processor,
            Arc::new(BatchMetrics::new()),
        );

        let t0 = Instant::now();
        batcher.add_at(event("a"), t0);
        assert!(batcher.flush_at(t0 + secs(2)));
        batcher.add_at(event("b"), t0 + secs(3));
        assert_eq!(scheduler.last_requested_delay(), Some(secs(9)));
    }

    #[test]
    fn test_throttle_flushes_first_event_immediately() {
        let scheduler = ManualScheduler::new();
        let (processor, seen) = recording_processor();
        let batcher = Batcher::new(
            "throttle",
            BatchPolicy::Throttle(ThrottlePolicy::new(vec![secs(30), secs(300)]).unwrap()),
            &scheduler,
            processor,
            Arc::new(BatchMetrics::new()),
        );

        let t0 = Instant::now();
        batcher.add_at(event("down"), t0);
        assert_eq!(scheduler.last_requested_delay(), Some(Duration::ZERO));
        assert!(batcher.flush_at(t0));

        batcher.add_at(event("still down"), t0 + secs(5));
        batcher.add_at(event("still down"), t0 + secs(6));
        // Second event does not re-arm a pending throttle timer
        assert_eq!(scheduler.requested_delays(), vec![Duration::ZERO, secs(25)]);
        assert!(batcher.flush_at(t0 + secs(30)));

        assert_eq!(
            *seen.lock(),
            vec![("down".to_string(), 1), ("still down".to_string(), 2)]
        );
    }

    #[test]
    fn test_empty_flush_is_skipped() {
        let scheduler = ManualScheduler::new();
        let (processor, seen) = recording_processor();
        let metrics = Arc::new(BatchMetrics::new());
        let batcher = Batcher::new(
            "empty",
            BatchPolicy::default(),
            &scheduler,
            processor,
            Arc::clone(&metrics),
        );
        assert!(!batcher.flush());
        assert!(seen.lock().is_empty());
        assert_eq!(metrics.batches_flushed(), 0);
    }

    #[test]
    fn test_processor_failure_is_reported() {
        let scheduler = ManualScheduler::new();
        let metrics = Arc::new(BatchMetrics::new());
        let processor = |_: &LogEventBatch| -> Result<()> {
            Err(LoggerError::destination("slack", "HTTP 503"))
        };
        let batcher = Batcher::new(
            "failing-batcher-test",
            BatchPolicy::default(),
            &scheduler,
            Arc::new(processor),
            Arc::clone(&metrics),
        );

        batcher.add(event("lost"));
        assert!(batcher.flush());
        assert_eq!(metrics.processor_failures(), 1);
        assert!(!StatusChannel::global()
            .messages_for("failing-batcher-test")
            .is_empty());

        // The batcher keeps working afterwards
        batcher.add(event("next"));
        assert_eq!(batcher.pending_events(), 1);
    }

    #[test]
    fn test_mdc_partitions_are_independent() {
        let scheduler: Arc<dyn Scheduler> = Arc::new(ManualScheduler::new());
        let (processor, seen) = recording_processor();
        let batcher = MdcBatcher::new(
            "tenants",
            "tenant",
            BatchPolicy::default(),
            scheduler,
            processor,
            Arc::new(BatchMetrics::new()),
        );

        let t0 = Instant::now();
        let mdc = |tenant: &str| {
            let mut map = std::collections::BTreeMap::new();
            map.insert("tenant".to_string(), tenant.to_string());
            Arc::new(map)
        };
        batcher.add_at(event("quota").with_mdc(mdc("a")), t0);
        batcher.add_at(event("quota").with_mdc(mdc("b")), t0);
        batcher.add_at(event("quota").with_mdc(mdc("a")), t0);
        batcher.add_at(event("quota"), t0);

        assert_eq!(batcher.partition_count(), 3);
        assert_eq!(batcher.partition(Some("a")).pending_events(), 2);
        assert_eq!(batcher.flush_at(t0 + secs(5)), 3);
        assert_eq!(seen.lock().len(), 3);
    }
}
