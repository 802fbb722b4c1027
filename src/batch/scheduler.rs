//! Timer seam between batchers and the threads that flush them

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Flushes one accumulator; invoked off the logging thread
pub type FlushAction = Arc<dyn Fn() + Send + Sync>;

/// One-off work for a flush thread
pub type FlushJob = Box<dyn FnOnce() + Send>;

/// Source of flush timers
pub trait Scheduler: Send + Sync {
    /// Create the single timer of one accumulator
    ///
    /// The scheduler only keeps `action` weakly; the timer goes quiet once
    /// the owner drops it.
    fn create_timer(&self, action: Weak<dyn Fn() + Send + Sync>) -> Box<dyn FlushTimer>;

    /// Run `job` on a flush thread, handing it back when none is available
    fn execute(&self, job: FlushJob) -> std::result::Result<(), FlushJob> {
        Err(job)
    }
}

/// At most one pending deadline; arming again supersedes the previous one
pub trait FlushTimer: Send + Sync {
    fn schedule(&self, delay: Duration);
}

/// Scheduler that only fires when told to, for deterministic tests
///
/// # Example
///
/// ```
/// use rust_logevents::batch::{ManualScheduler, Scheduler};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = ManualScheduler::new();
/// let fired = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&fired);
/// let action: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// let timer = scheduler.create_timer(Arc::downgrade(&action));
/// timer.schedule(Duration::from_secs(5));
/// timer.schedule(Duration::from_secs(1));
///
/// assert_eq!(scheduler.fire_all(), 1);
/// assert_eq!(fired.load(Ordering::SeqCst), 1);
/// assert_eq!(scheduler.requested_delays(), vec![Duration::from_secs(5), Duration::from_secs(1)]);
/// ```
#[derive(Clone, Default)]
pub struct ManualScheduler {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    slots: Vec<ManualSlot>,
    requested: Vec<Duration>,
}

struct ManualSlot {
    action: Weak<dyn Fn() + Send + Sync>,
    pending: Option<Duration>,
}

struct ManualTimer {
    slot: usize,
    inner: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order
    pub fn requested_delays(&self) -> Vec<Duration> {
        self.inner.lock().requested.clone()
    }

    pub fn last_requested_delay(&self) -> Option<Duration> {
        self.inner.lock().requested.last().copied()
    }

    /// Number of timers currently armed
    pub fn pending(&self) -> usize {
        self.inner
            .lock()
            .slots
            .iter()
            .filter(|slot| slot.pending.is_some())
            .count()
    }

    /// Run every armed timer on the calling thread, returning how many fired
    pub fn fire_all(&self) -> usize {
        let due: Vec<_> = {
            let mut state = self.inner.lock();
            state
                .slots
                .iter_mut()
                .filter_map(|slot| slot.pending.take().and_then(|_| slot.action.upgrade()))
                .collect()
        };
        for action in &due {
            action();
        }
        due.len()
    }
}

impl Scheduler for ManualScheduler {
    fn create_timer(&self, action: Weak<dyn Fn() + Send + Sync>) -> Box<dyn FlushTimer> {
        let mut state = self.inner.lock();
        state.slots.push(ManualSlot {
            action,
            pending: None,
        });
        Box::new(ManualTimer {
            slot: state.slots.len() - 1,
            inner: Arc::clone(&self.inner),
        })
    }
}

impl FlushTimer for ManualTimer {
    fn schedule(&self, delay: Duration) {
        let mut state = self.inner.lock();
        state.requested.push(delay);
        if let Some(slot) = state.slots.get_mut(self.slot) {
            slot.pending = Some(delay);
        }
    }
}
