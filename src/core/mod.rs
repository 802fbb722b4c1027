//! Core logger types and traits

pub mod config;
pub mod error;
pub mod filter;
pub mod generator;
pub mod log_context;
pub mod log_event;
pub mod log_level;
pub mod logger;
pub mod marker;
pub mod metrics;
pub mod observer;
pub mod output_format;
pub mod predicate;
pub mod registry;
pub mod status;
pub mod timestamp;

pub use config::{
    parse_duration, parse_duration_list, parse_properties, BatchPolicyConfig, BatchingConfig,
    LogConfiguration, LoggerConfig, MarkerBatchingConfig,
};
pub use error::{LoggerError, Result};
pub use filter::Filter;
pub use generator::{EventBuilder, EventGenerator};
pub use log_context::{FieldValue, Mdc, MdcGuard, MdcSnapshot};
pub use log_event::{CallSite, ErrorInfo, LogEvent};
pub use log_level::LogLevel;
pub use logger::{HierarchyBuilder, Logger, LoggerHierarchy, ROOT_LOGGER_NAME};
pub use marker::{Marker, MarkerSet};
pub use metrics::{BatchMetrics, LoggerMetrics};
pub use observer::{
    null_observer, CompositeObserver, ConditionalObserver, NullObserver, Observer, ObserverRef,
};
pub use output_format::{EventFormatter, OutputFormat};
pub use predicate::Predicate;
pub use registry::{ObserverFactory, ObserverRegistry};
pub use status::{StatusChannel, StatusEvent, StatusLevel};
pub use timestamp::TimestampFormat;
