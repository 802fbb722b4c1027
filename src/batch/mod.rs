//! Batching runtime
//!
//! Events are collected into [`LogEventBatch`]es, consecutive duplicates
//! folded into groups, and handed to a [`BatchProcessor`] on a background
//! worker when the batch's [`BatchPolicy`] says so.

pub mod accumulator;
pub mod batcher;
pub mod executor;
pub mod policy;
pub mod scheduler;

pub use accumulator::{BatchAccumulator, LogEventBatch, LogEventGroup};
pub use batcher::{BatchProcessor, Batcher, MdcBatcher};
pub use executor::{FlushExecutor, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_WORKER_COUNT};
pub use policy::{
    deadline_after, BatchPolicy, CooldownPolicy, ThrottlePolicy, ThrottleState,
    DEFAULT_COOLDOWN_TIME, DEFAULT_IDLE_THRESHOLD, DEFAULT_MAXIMUM_WAIT_TIME, MAXIMUM_DELAY,
};
pub use scheduler::{FlushAction, FlushJob, FlushTimer, ManualScheduler, Scheduler};
