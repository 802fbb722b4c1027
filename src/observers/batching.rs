//! Destination that collects events into batches

use crate::batch::{
    BatchPolicy, BatchProcessor, Batcher, FlushExecutor, FlushJob, LogEventBatch, MdcBatcher,
    Scheduler,
};
use crate::core::config::BatchingConfig;
use crate::core::metrics::BatchMetrics;
use crate::core::{LogEvent, Marker, Observer, ObserverRef, Result};
use std::sync::Arc;
use std::time::Instant;

enum Route {
    Single(Arc<Batcher>),
    ByMdc(MdcBatcher),
}

impl Route {
    fn add(&self, event: LogEvent, now: Instant) {
        match self {
            Route::Single(batcher) => batcher.add_at(event, now),
            Route::ByMdc(batcher) => batcher.add_at(event, now),
        }
    }

    fn flush(&self, now: Instant) {
        match self {
            Route::Single(batcher) => {
                batcher.flush_at(now);
            }
            Route::ByMdc(batcher) => {
                batcher.flush_at(now);
            }
        }
    }

    fn batchers(&self) -> Vec<Arc<Batcher>> {
        match self {
            Route::Single(batcher) => vec![Arc::clone(batcher)],
            Route::ByMdc(batcher) => batcher.batchers(),
        }
    }
}

/// Routes events to a default batcher or to per-marker batchers
///
/// An event goes to the first marker route whose marker its own marker
/// contains; everything else goes to the default batcher. Each route has
/// its own accumulator and timer, so a noisy marker cannot delay the rest.
pub struct BatchingObserver {
    name: String,
    default: Route,
    markers: Vec<(Marker, Route)>,
    scheduler: Arc<dyn Scheduler>,
    metrics: Arc<BatchMetrics>,
}

impl BatchingObserver {
    pub fn builder(name: impl Into<String>, processor: impl BatchProcessor) -> BatchingObserverBuilder {
        BatchingObserverBuilder {
            name: name.into(),
            processor: Arc::new(processor),
            policy: BatchPolicy::default(),
            scheduler: None,
            markers: Vec::new(),
        }
    }

    /// Build from configuration, flushing on `scheduler`
    pub fn from_config(
        name: impl Into<String>,
        config: &BatchingConfig,
        processor: Arc<dyn BatchProcessor>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self> {
        let mut builder = BatchingObserverBuilder {
            name: name.into(),
            processor,
            policy: config.policy.policy()?,
            scheduler: Some(scheduler),
            markers: Vec::new(),
        };
        for (marker, settings) in &config.markers {
            builder.markers.push((
                Marker::new(marker.as_str()),
                settings.policy.policy()?,
                settings.mdc.clone(),
            ));
        }
        builder.build()
    }

    pub fn metrics(&self) -> &BatchMetrics {
        &self.metrics
    }

    fn route(&self, marker: Option<&Marker>) -> &Route {
        marker
            .and_then(|marker| {
                self.markers
                    .iter()
                    .find(|(route_marker, _)| marker.contains(route_marker))
            })
            .map_or(&self.default, |(_, route)| route)
    }
}

impl Observer for BatchingObserver {
    fn log_event(&self, event: &LogEvent) -> Result<()> {
        self.route(event.marker.as_ref())
            .add(event.clone(), Instant::now());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// Flush every open batch on the calling thread
    fn flush(&self) -> Result<()> {
        let now = Instant::now();
        self.default.flush(now);
        for (_, route) in &self.markers {
            route.flush(now);
        }
        Ok(())
    }
}

// The last handle may be released on a logging thread, so the drain goes
// to the scheduler's workers when it has any
impl Drop for BatchingObserver {
    fn drop(&mut self) {
        let pending: Vec<Arc<Batcher>> = std::iter::once(&self.default)
            .chain(self.markers.iter().map(|(_, route)| route))
            .flat_map(Route::batchers)
            .filter(|batcher| batcher.pending_events() > 0)
            .collect();
        if pending.is_empty() {
            return;
        }
        let drain: FlushJob = Box::new(move || {
            for batcher in &pending {
                batcher.flush();
            }
        });
        if let Err(drain) = self.scheduler.execute(drain) {
            drain();
        }
    }
}

#[must_use = "builder methods return a new value"]
pub struct BatchingObserverBuilder {
    name: String,
    processor: Arc<dyn BatchProcessor>,
    policy: BatchPolicy,
    scheduler: Option<Arc<dyn Scheduler>>,
    markers: Vec<(Marker, BatchPolicy, Option<String>)>,
}

impl BatchingObserverBuilder {
    /// Policy of the default batcher
    pub fn policy(mut self, policy: BatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Defaults to the global `FlushExecutor`
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn marker(mut self, marker: Marker, policy: BatchPolicy) -> Self {
        self.markers.push((marker, policy, None));
        self
    }

    /// One batcher per value of `mdc_key` among events with `marker`
    pub fn marker_by_mdc(mut self, marker: Marker, mdc_key: impl Into<String>, policy: BatchPolicy) -> Self {
        self.markers.push((marker, policy, Some(mdc_key.into())));
        self
    }

    pub fn build(self) -> Result<BatchingObserver> {
        let scheduler: Arc<dyn Scheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => FlushExecutor::global()? as Arc<dyn Scheduler>,
        };
        let metrics = Arc::new(BatchMetrics::new());
        let default = Route::Single(Batcher::new(
            self.name.as_str(),
            self.policy,
            scheduler.as_ref(),
            Arc::clone(&self.processor),
            Arc::clone(&metrics),
        ));
        let markers = self
            .markers
            .into_iter()
            .map(|(marker, policy, mdc_key)| {
                let name = format!("{}/{}", self.name, marker);
                let route = match mdc_key {
                    Some(key) => Route::ByMdc(MdcBatcher::new(
                        name,
                        key,
                        policy,
                        Arc::clone(&scheduler),
                        Arc::clone(&self.processor),
                        Arc::clone(&metrics),
                    )),
                    None => Route::Single(Batcher::new(
                        name,
                        policy,
                        scheduler.as_ref(),
                        Arc::clone(&self.processor),
                        Arc::clone(&metrics),
                    )),
                };
                (marker, route)
            })
            .collect();
        Ok(BatchingObserver {
            name: self.name,
            default,
            markers,
            scheduler,
            metrics,
        })
    }
}

/// Renders each group as one line on another destination
///
/// A group of repeats becomes `message (xN)` using the first occurrence's
/// arguments. Formatting and I/O happen on the flush worker.
pub struct SummaryProcessor {
    target: ObserverRef,
}

impl SummaryProcessor {
    pub fn new(target: ObserverRef) -> Self {
        Self { target }
    }
}

impl BatchProcessor for SummaryProcessor {
    fn process_batch(&self, batch: &LogEventBatch) -> Result<()> {
        let mut first_error = None;
        for group in batch {
            let result = if group.count() > 1 {
                let head = group.head();
                let mut summary = head.clone();
                summary.template = format!("{} (x{})", head.formatted_message(), group.count());
                summary.args.clear();
                self.target.log_event(&summary)
            } else {
                self.target.log_event(group.head())
            };
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        self.target.flush()?;
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{CooldownPolicy, ManualScheduler, ThrottlePolicy, DEFAULT_SHUTDOWN_TIMEOUT};
    use crate::core::LogLevel;
    use crate::observers::BufferObserver;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn event(template: &str, marker: Option<Marker>) -> LogEvent {
        LogEvent::new(Arc::from("batching.test"), LogLevel::Warn, template).with_marker(marker)
    }

    #[test]
    fn test_summary_lines_after_flush() {
        let scheduler = ManualScheduler::new();
        let buffer = Arc::new(BufferObserver::new());
        let observer = BatchingObserver::builder("summary", SummaryProcessor::new(buffer.clone()))
            .scheduler(Arc::new(scheduler.clone()))
            .build()
            .unwrap();

        for _ in 0..3 {
            observer.log_event(&event("retrying", None)).unwrap();
        }
        observer.log_event(&event("gave up", None)).unwrap();
        assert!(buffer.is_empty());

        scheduler.fire_all();
        assert_eq!(buffer.messages(), vec!["retrying (x3)", "gave up"]);
        assert_eq!(observer.metrics().events_accepted(), 4);
        assert_eq!(observer.metrics().batches_flushed(), 1);
    }

    #[test]
    fn test_marker_routes_have_own_batches() {
        let scheduler = ManualScheduler::new();
        let buffer = Arc::new(BufferObserver::new());
        let ops = Marker::new("OPS");
        let paging = Marker::with_references("PAGING", [ops.clone()]);
        let observer = BatchingObserver::builder("routes", SummaryProcessor::new(buffer.clone()))
            .scheduler(Arc::new(scheduler.clone()))
            .marker(
                ops.clone(),
                BatchPolicy::Throttle(ThrottlePolicy::new(vec![Duration::from_secs(30)]).unwrap()),
            )
            .build()
            .unwrap();

        observer.log_event(&event("plain", None)).unwrap();
        observer.log_event(&event("page", Some(paging))).unwrap();

        // Throttled marker route asks for an immediate flush, the default waits
        assert!(scheduler.requested_delays().contains(&Duration::ZERO));
        assert_eq!(scheduler.pending(), 2);

        observer.flush().unwrap();
        let mut messages = buffer.messages();
        messages.sort();
        assert_eq!(messages, vec!["page", "plain"]);
    }

    #[test]
    fn test_from_config_with_mdc_partition() {
        let scheduler = ManualScheduler::new();
        let buffer = Arc::new(BufferObserver::new());
        let mut properties = BTreeMap::new();
        properties.insert("idleThreshold".to_string(), "PT1S".to_string());
        properties.insert("markers.OPS.mdc".to_string(), "tenant".to_string());
        let config = BatchingConfig::from_properties(&properties);

        let observer = BatchingObserver::from_config(
            "configured",
            &config,
            Arc::new(SummaryProcessor::new(buffer.clone())),
            Arc::new(scheduler.clone()),
        )
        .unwrap();

        for tenant in ["a", "b"] {
            let _tenant = crate::core::Mdc::put("tenant", tenant);
            observer
                .log_event(&event("quota", Some(Marker::new("OPS"))))
                .unwrap();
        }
        assert_eq!(scheduler.fire_all(), 2);
        assert_eq!(buffer.len(), 2);
        assert_eq!(
            scheduler.requested_delays()[0],
            CooldownPolicy::default().idle_threshold
        );
    }

    fn flush_thread_recorder() -> (
        impl BatchProcessor,
        Arc<parking_lot::Mutex<Option<std::thread::ThreadId>>>,
    ) {
        let flushed_on = Arc::new(parking_lot::Mutex::new(None));
        let slot = Arc::clone(&flushed_on);
        let processor = move |_: &LogEventBatch| -> Result<()> {
            *slot.lock() = Some(std::thread::current().id());
            Ok(())
        };
        (processor, flushed_on)
    }

    #[test]
    fn test_drop_drains_on_flush_worker() {
        let executor = FlushExecutor::new(1).unwrap();
        let (processor, flushed_on) = flush_thread_recorder();
        let observer = BatchingObserver::builder("dropped", processor)
            .policy(BatchPolicy::Cooldown(CooldownPolicy::new(
                Duration::from_secs(3600),
                Duration::from_secs(3600),
                Duration::from_secs(3600),
            )))
            .scheduler(executor.clone() as Arc<dyn Scheduler>)
            .build()
            .unwrap();

        observer.log_event(&event("pending", None)).unwrap();
        drop(observer);
        assert!(executor.shutdown(DEFAULT_SHUTDOWN_TIMEOUT));

        let flushed_on = *flushed_on.lock();
        assert!(flushed_on.is_some());
        assert_ne!(flushed_on, Some(std::thread::current().id()));
    }

    #[test]
    fn test_drop_without_workers_flushes_inline() {
        let (processor, flushed_on) = flush_thread_recorder();
        let observer = BatchingObserver::builder("inline", processor)
            .scheduler(Arc::new(ManualScheduler::new()))
            .build()
            .unwrap();

        observer.log_event(&event("pending", None)).unwrap();
        drop(observer);
        assert_eq!(*flushed_on.lock(), Some(std::thread::current().id()));
    }
}
