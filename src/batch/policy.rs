//! Flush timing policies
//!
//! Both policies are pure: they map clock readings to the instant the open
//! batch should be flushed. The batcher owns the clock and the timer.

use crate::core::{LoggerError, Result};
use std::time::{Duration, Instant};

pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(5);
pub const DEFAULT_COOLDOWN_TIME: Duration = Duration::from_secs(15);
pub const DEFAULT_MAXIMUM_WAIT_TIME: Duration = Duration::from_secs(60);

/// Longest delay a flush is ever scheduled ahead; longer settings are capped
pub const MAXIMUM_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// `at + delay`, with `delay` capped at [`MAXIMUM_DELAY`]
pub fn deadline_after(at: Instant, delay: Duration) -> Instant {
    at.checked_add(delay.min(MAXIMUM_DELAY)).unwrap_or(at)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPolicy {
    Cooldown(CooldownPolicy),
    Throttle(ThrottlePolicy),
}

impl Default for BatchPolicy {
    fn default() -> Self {
        BatchPolicy::Cooldown(CooldownPolicy::default())
    }
}

/// Wait for quiet, but not longer than a hard bound
///
/// # Example
///
/// ```
/// use rust_logevents::batch::CooldownPolicy;
/// use std::time::{Duration, Instant};
///
/// let policy = CooldownPolicy::new(
///     Duration::from_secs(2),
///     Duration::from_secs(10),
///     Duration::from_secs(30),
/// );
/// let start = Instant::now();
/// // First event ever: flush once the stream has been idle for 2s
/// assert_eq!(policy.next_flush_time(start, start, None), start + Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    /// Settle time after the most recent event
    pub idle_threshold: Duration,
    /// Minimum spacing between two flushes
    pub cooldown_time: Duration,
    /// Upper bound measured from the first event of the open batch
    pub maximum_wait_time: Duration,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            cooldown_time: DEFAULT_COOLDOWN_TIME,
            maximum_wait_time: DEFAULT_MAXIMUM_WAIT_TIME,
        }
    }
}

impl CooldownPolicy {
    pub fn new(idle_threshold: Duration, cooldown_time: Duration, maximum_wait_time: Duration) -> Self {
        Self {
            idle_threshold,
            cooldown_time,
            maximum_wait_time,
        }
    }

    /// Flush instant for an open batch
    ///
    /// The later of `latest_event + idle_threshold` and
    /// `last_flush + cooldown_time`, capped at `first_event + maximum_wait_time`.
    pub fn next_flush_time(
        &self,
        first_event: Instant,
        latest_event: Instant,
        last_flush: Option<Instant>,
    ) -> Instant {
        let settled = deadline_after(latest_event, self.idle_threshold);
        let cooled = last_flush.map_or(settled, |at| deadline_after(at, self.cooldown_time));
        settled
            .max(cooled)
            .min(deadline_after(first_event, self.maximum_wait_time))
    }
}

/// Escalating fixed delays between flushes
///
/// The first event after an idle period flushes immediately. Each further
/// flush waits for the next delay in the list, the last one repeating. A
/// full delay period without events resets the escalation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottlePolicy {
    delays: Vec<Duration>,
}

/// Escalation progress of one throttled batcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThrottleState {
    last_flush: Option<Instant>,
    /// Index of the delay guarding the next flush; `None` while idle
    armed: Option<usize>,
    /// Index to arm once the scheduled flush happens
    next_armed: usize,
}

impl ThrottleState {
    pub fn last_flush(&self) -> Option<Instant> {
        self.last_flush
    }

    pub fn armed_delay_index(&self) -> Option<usize> {
        self.armed
    }
}

impl ThrottlePolicy {
    pub fn new(delays: Vec<Duration>) -> Result<Self> {
        if delays.is_empty() {
            return Err(LoggerError::config("throttle", "at least one delay is required"));
        }
        Ok(Self { delays })
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    fn delay(&self, index: usize) -> Duration {
        self.delays[index.min(self.delays.len() - 1)]
    }

    /// Flush instant for an event arriving at `now` while no flush is pending
    pub fn schedule(&self, state: &mut ThrottleState, now: Instant) -> Instant {
        match (state.last_flush, state.armed) {
            (Some(last), Some(index)) if now.saturating_duration_since(last) <= self.delay(index) => {
                state.next_armed = (index + 1).min(self.delays.len() - 1);
                deadline_after(last, self.delay(index))
            }
            _ => {
                state.next_armed = 0;
                now
            }
        }
    }

    /// Record a flush performed at `at`
    pub fn flushed(&self, state: &mut ThrottleState, at: Instant) {
        state.last_flush = Some(at);
        state.armed = Some(state.next_armed);
    }
}
