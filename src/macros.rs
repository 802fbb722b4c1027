//! Logging macros for ergonomic log message formatting.
//!
//! The message is only formatted when the level is enabled for the logger,
//! and the call site is captured where the macro is expanded.
//!
//! # Examples
//!
//! ```
//! use rust_logevents::prelude::*;
//! use rust_logevents::{info, warn};
//! use std::sync::Arc;
//!
//! let buffer = Arc::new(BufferObserver::new());
//! let hierarchy = LoggerHierarchy::builder().root_observer(buffer.clone()).build();
//! let logger = hierarchy.get_logger("server");
//!
//! info!(logger, "Server started");
//! let port = 8080;
//! warn!(logger, "Port {} already bound", port);
//!
//! assert_eq!(buffer.messages(), vec!["Server started", "Port 8080 already bound"]);
//! ```

/// Source location of the macro invocation as a [`CallSite`](crate::CallSite)
#[macro_export]
macro_rules! call_site {
    () => {
        $crate::CallSite {
            file: file!(),
            line: line!(),
            module_path: module_path!(),
        }
    };
}

/// Log a message with automatic formatting.
///
/// A `marker: expr` argument before the message tags the event. When the
/// message is a format string literal, events keep it as their pattern, so
/// repeats with different arguments still group together in batches.
///
/// # Examples
///
/// ```
/// # use rust_logevents::prelude::*;
/// # let hierarchy = LoggerHierarchy::builder().root_observer(std::sync::Arc::new(BufferObserver::new())).build();
/// # let logger = hierarchy.get_logger("app");
/// use rust_logevents::log;
/// let audit = Marker::new("AUDIT");
/// log!(logger, LogLevel::Info, "Simple message");
/// log!(logger, LogLevel::Error, "Error code: {}", 500);
/// log!(logger, LogLevel::Warn, marker: audit, "User {} escalated", "alice");
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, marker: $marker:expr, $fmt:literal $($rest:tt)*) => {{
        let logger: &$crate::Logger = &$logger;
        let level: $crate::LogLevel = $level;
        let marker: &$crate::Marker = &$marker;
        if logger.is_enabled_for(level, marker) {
            logger
                .at(level)
                .marker(marker)
                .call_site($crate::call_site!())
                .pattern($fmt)
                .log(format!($fmt $($rest)*));
        }
    }};
    ($logger:expr, $level:expr, marker: $marker:expr, $($arg:tt)+) => {{
        let logger: &$crate::Logger = &$logger;
        let level: $crate::LogLevel = $level;
        let marker: &$crate::Marker = &$marker;
        if logger.is_enabled_for(level, marker) {
            logger
                .at(level)
                .marker(marker)
                .call_site($crate::call_site!())
                .log(format!($($arg)+));
        }
    }};
    ($logger:expr, $level:expr, $fmt:literal $($rest:tt)*) => {{
        let logger: &$crate::Logger = &$logger;
        let level: $crate::LogLevel = $level;
        if logger.is_enabled(level) {
            logger
                .at(level)
                .call_site($crate::call_site!())
                .pattern($fmt)
                .log(format!($fmt $($rest)*));
        }
    }};
    ($logger:expr, $level:expr, $($arg:tt)+) => {{
        let logger: &$crate::Logger = &$logger;
        let level: $crate::LogLevel = $level;
        if logger.is_enabled(level) {
            logger
                .at(level)
                .call_site($crate::call_site!())
                .log(format!($($arg)+));
        }
    }};
}

/// Log a trace-level message.
#[macro_export]
macro_rules! trace {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Trace, $($arg)+)
    };
}

/// Log a debug-level message.
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Debug, $($arg)+)
    };
}

/// Log an info-level message.
///
/// # Examples
///
/// ```
/// # use rust_logevents::prelude::*;
/// # let hierarchy = LoggerHierarchy::builder().root_observer(std::sync::Arc::new(BufferObserver::new())).build();
/// # let logger = hierarchy.get_logger("app");
/// use rust_logevents::info;
/// info!(logger, "Application started");
/// info!(logger, "Processing {} items", 100);
/// ```
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Info, $($arg)+)
    };
}

/// Log a warning-level message.
#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Warn, $($arg)+)
    };
}

/// Log an error-level message.
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Error, $($arg)+)
    };
}
