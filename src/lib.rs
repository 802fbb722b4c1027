//! # Rust LogEvents
//!
//! A hierarchical logging runtime with per-level dispatch and time-windowed
//! batching.
//!
//! ## Features
//!
//! - **Cheap disabled calls**: each logger precomputes one generator per
//!   level, so a disabled call is an atomic load and a branch
//! - **Filter algebra**: level thresholds combined with marker and MDC
//!   conditions, parsed from rules like `WARN,INFO@mdc:user=admin`
//! - **Hierarchy**: dotted logger names inherit filters and observers, and
//!   reconfiguration is atomic with respect to concurrent log calls
//! - **Batching**: cooldown and throttle policies group repeated messages
//!   and flush them on a small worker pool

pub mod batch;
pub mod core;
pub mod macros;
pub mod observers;

pub mod prelude {
    pub use crate::batch::{BatchPolicy, BatchProcessor, CooldownPolicy, LogEventBatch, ThrottlePolicy};
    pub use crate::core::{
        EventFormatter, FieldValue, Filter, LogConfiguration, LogEvent, LogLevel, Logger,
        LoggerError, LoggerHierarchy, LoggerMetrics, Marker, Mdc, Observer, ObserverRef,
        OutputFormat, Predicate, Result, StatusChannel, TimestampFormat,
    };
    pub use crate::observers::{
        BatchingObserver, BufferObserver, ConsoleObserver, FileObserver, FilteredObserver,
        LevelThresholdObserver, ObserverSpec, SummaryProcessor,
    };
}

pub use crate::core::{
    CallSite, EventFormatter, FieldValue, Filter, LogConfiguration, LogEvent, LogLevel, Logger,
    LoggerError, LoggerHierarchy, LoggerMetrics, Marker, Mdc, Observer, ObserverRef, OutputFormat,
    Predicate, Result, StatusChannel, TimestampFormat,
};
pub use observers::{BufferObserver, ConsoleObserver, FileObserver, ObserverSpec};
