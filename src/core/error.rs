//! Error types for the logging runtime

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// A configuration referenced an observer that is not registered
    #[error("Unknown observer '{name}'")]
    UnknownObserver { name: String },

    /// Malformed filter rule
    #[error("Invalid filter rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    /// Unrecognized level token
    #[error("Invalid log level: '{0}'")]
    InvalidLevel(String),

    /// Unparsable ISO-8601 duration
    #[error("Invalid duration '{value}': expected ISO-8601 such as PT30S or PT5M")]
    InvalidDuration { value: String },

    /// Predicate that cannot be negated or composed
    #[error("Cannot compose predicate: {0}")]
    IrreduciblePredicate(String),

    /// Destination failed to accept an event or batch
    #[error("Destination '{destination}' failed: {message}")]
    DestinationError { destination: String, message: String },

    /// Destination is suspended after repeated failures
    #[error("Destination '{destination}' suspended after {failures} successive failures")]
    CircuitOpen { destination: String, failures: u32 },

    /// Flush worker could not be started
    #[error("Failed to start flush worker: {0}")]
    WorkerSpawn(String),

    /// Flush executor already shut down
    #[error("Flush executor already stopped")]
    ExecutorStopped,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl LoggerError {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LoggerError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn unknown_observer(name: impl Into<String>) -> Self {
        LoggerError::UnknownObserver { name: name.into() }
    }

    pub fn invalid_rule(rule: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidRule {
            rule: rule.into(),
            message: message.into(),
        }
    }

    pub fn invalid_duration(value: impl Into<String>) -> Self {
        LoggerError::InvalidDuration {
            value: value.into(),
        }
    }

    pub fn irreducible<S: Into<String>>(msg: S) -> Self {
        LoggerError::IrreduciblePredicate(msg.into())
    }

    /// Create a destination error
    pub fn destination(destination: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::DestinationError {
            destination: destination.into(),
            message: message.into(),
        }
    }

    pub fn circuit_open(destination: impl Into<String>, failures: u32) -> Self {
        LoggerError::CircuitOpen {
            destination: destination.into(),
            failures,
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        LoggerError::Other(msg.into())
    }

    /// Whether this error belongs to the configuration class
    ///
    /// Configuration errors abort a reload and leave the previous configuration active.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            LoggerError::InvalidConfiguration { .. }
                | LoggerError::UnknownObserver { .. }
                | LoggerError::InvalidRule { .. }
                | LoggerError::InvalidLevel(_)
                | LoggerError::InvalidDuration { .. }
                | LoggerError::IrreduciblePredicate(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = LoggerError::unknown_observer("slack");
        assert!(matches!(err, LoggerError::UnknownObserver { .. }));

        let err = LoggerError::config("BatchingObserver", "missing processor");
        assert!(matches!(err, LoggerError::InvalidConfiguration { .. }));

        let err = LoggerError::destination("file", "Permission denied");
        assert!(matches!(err, LoggerError::DestinationError { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = LoggerError::unknown_observer("slack");
        assert_eq!(err.to_string(), "Unknown observer 'slack'");

        let err = LoggerError::invalid_rule("mdc:user", "expected '=' or '!='");
        assert_eq!(
            err.to_string(),
            "Invalid filter rule 'mdc:user': expected '=' or '!='"
        );

        let err = LoggerError::circuit_open("file", 11);
        assert_eq!(
            err.to_string(),
            "Destination 'file' suspended after 11 successive failures"
        );
    }

    #[test]
    fn test_configuration_classification() {
        assert!(LoggerError::invalid_duration("soon").is_configuration_error());
        assert!(LoggerError::irreducible("inherit").is_configuration_error());
        assert!(!LoggerError::destination("file", "disk full").is_configuration_error());
        assert!(!LoggerError::ExecutorStopped.is_configuration_error());
    }

    #[test]
    fn test_io_operation_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = LoggerError::io_operation("writing log file", "cannot write to file", io_err);

        assert!(matches!(err, LoggerError::IoOperation { .. }));
        assert!(err.to_string().contains("writing log file"));
    }
}
