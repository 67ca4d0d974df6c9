use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodewatcherError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid event sink: {message}")]
    InvalidEventSink { message: String },

    #[error("An event sink with name '{name}' is already registered")]
    EventSinkAlreadyRegistered { name: String },

    #[error("No event sink with name '{name}' is registered")]
    EventSinkNotRegistered { name: String },

    #[error("Device '{identifier}' is already registered for platform '{platform}'")]
    DeviceAlreadyRegistered { platform: String, identifier: String },

    #[error("Device '{identifier}' not found")]
    DeviceNotFound { identifier: String },

    #[error("Invalid device descriptor '{identifier}': {reason}")]
    InvalidDevice { identifier: String, reason: String },

    #[error("Improperly configured: {message}")]
    ImproperlyConfigured { message: String },

    #[error("Inconsistent configuration for stream {query}")]
    InconsistentStreamConfiguration { query: String },

    #[error("Stream '{stream}' not found")]
    StreamNotFound { stream: String },

    #[error("Invalid datapoint value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid tag: {message}")]
    InvalidTag { message: String },

    #[error("Granularity '{requested}' is finer than the stream's highest granularity '{highest}'")]
    InvalidGranularity { requested: String, highest: String },

    #[error("Node '{id}' not found")]
    NodeNotFound { id: String },

    #[error("User '{user}' lacks permission '{permission}'")]
    PermissionDenied { user: String, permission: String },

    #[error("Invalid node configuration: {}", .errors.join("; "))]
    InvalidNodeConfig { errors: Vec<String> },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Network,
    Storage,
    Data,
    Registry,
    Permission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl NodewatcherError {
    pub fn category(&self) -> ErrorCategory {
        use NodewatcherError::*;
        match self {
            HttpError(_) => ErrorCategory::Network,
            CsvError(_) | IoError(_) => ErrorCategory::Storage,
            SerializationError(_)
            | InvalidValue { .. }
            | InvalidTag { .. }
            | InvalidGranularity { .. }
            | ProcessingError { .. }
            | InconsistentStreamConfiguration { .. }
            | StreamNotFound { .. }
            | ValidationError { .. }
            | InvalidNodeConfig { .. }
            | NodeNotFound { .. } => ErrorCategory::Data,
            ConfigError { .. }
            | ConfigValidationError { .. }
            | InvalidConfigValueError { .. }
            | ImproperlyConfigured { .. } => ErrorCategory::Config,
            InvalidEventSink { .. }
            | EventSinkAlreadyRegistered { .. }
            | EventSinkNotRegistered { .. }
            | DeviceAlreadyRegistered { .. }
            | DeviceNotFound { .. }
            | InvalidDevice { .. } => ErrorCategory::Registry,
            PermissionDenied { .. } => ErrorCategory::Permission,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        use NodewatcherError::*;
        match self {
            EventSinkAlreadyRegistered { .. } | DeviceAlreadyRegistered { .. } => ErrorSeverity::Low,
            HttpError(_) | InconsistentStreamConfiguration { .. } => ErrorSeverity::Medium,
            IoError(_) | ImproperlyConfigured { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Config => format!("Configuration problem: {}", self),
            ErrorCategory::Network => format!("Could not reach a node or endpoint: {}", self),
            ErrorCategory::Storage => format!("Could not read or write data: {}", self),
            ErrorCategory::Data => format!("Invalid data: {}", self),
            ErrorCategory::Registry => format!("Registry problem: {}", self),
            ErrorCategory::Permission => format!("Access denied: {}", self),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        use NodewatcherError::*;
        match self {
            HttpError(_) => "Check that the node is reachable and its telemetry URL is correct",
            IoError(_) => "Check that the data directory exists and is writable",
            ConfigError { .. }
            | ConfigValidationError { .. }
            | InvalidConfigValueError { .. } => "Review the configuration file",
            PermissionDenied { .. } => "Ask an administrator to grant the required permission",
            InvalidNodeConfig { .. } => "Fix the listed node configuration errors and retry",
            DeviceNotFound { .. } => "Run `nodewatcher devices` to list supported devices",
            InconsistentStreamConfiguration { .. } => {
                "Reset the node to drop its existing streams"
            }
            _ => "Retry the operation; if the problem persists, run with --verbose",
        }
    }
}

pub type Result<T> = std::result::Result<T, NodewatcherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Low < ErrorSeverity::Critical);
        assert!(ErrorSeverity::Medium < ErrorSeverity::High);
    }

    #[test]
    fn test_node_config_error_lists_all_problems() {
        let err = NodewatcherError::InvalidNodeConfig {
            errors: vec!["name: empty".to_string(), "router: unknown".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Invalid node configuration: name: empty; router: unknown"
        );
        assert_eq!(err.category(), ErrorCategory::Data);
        assert_eq!(err.severity(), ErrorSeverity::High);
    }

    #[test]
    fn test_permission_category() {
        let err = NodewatcherError::PermissionDenied {
            user: "alice".to_string(),
            permission: "delete_node".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Permission);
        assert!(err.user_friendly_message().starts_with("Access denied"));
    }
}
