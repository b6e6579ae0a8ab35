//! Engine Error Types
//!
//! Error handling for probe measurement, strategy transitions, configuration
//! and facade lifecycle misuse.

use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug, Clone)]
pub enum RealtimeError {
    /// A health-check round trip failed
    #[error("Probe error: {message}")]
    Probe { message: String },

    /// A bounded operation did not finish in time
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Applying a recommended strategy failed
    #[error("Transition error for '{feature}': {message}")]
    Transition { feature: String, message: String },

    /// Feature id is not registered with the engine
    #[error("Unknown feature: {feature}")]
    UnknownFeature { feature: String },

    /// Facade used before `initialize`
    #[error("programmer error: {operation} called before the adaptive realtime engine was initialized")]
    NotInitialized { operation: String },

    /// Engine handle already closed
    #[error("Engine disposed: {operation} called after close")]
    Disposed { operation: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, RealtimeError>;

impl RealtimeError {
    /// Create a probe error
    pub fn probe(message: impl Into<String>) -> Self {
        Self::Probe {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a transition error
    pub fn transition(feature: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transition {
            feature: feature.into(),
            message: message.into(),
        }
    }

    pub fn unknown_feature(feature: impl Into<String>) -> Self {
        Self::UnknownFeature {
            feature: feature.into(),
        }
    }

    pub fn not_initialized(operation: impl Into<String>) -> Self {
        Self::NotInitialized {
            operation: operation.into(),
        }
    }

    pub fn disposed(operation: impl Into<String>) -> Self {
        Self::Disposed {
            operation: operation.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Measurement problems that the next monitor tick may not see again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RealtimeError::Probe { .. } | RealtimeError::Timeout { .. } | RealtimeError::Io { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            RealtimeError::Probe { .. } => "probe",
            RealtimeError::Timeout { .. } => "timeout",
            RealtimeError::Transition { .. } => "transition",
            RealtimeError::UnknownFeature { .. } => "unknown_feature",
            RealtimeError::NotInitialized { .. } => "not_initialized",
            RealtimeError::Disposed { .. } => "disposed",
            RealtimeError::Configuration { .. } => "configuration",
            RealtimeError::Io { .. } => "io",
        }
    }
}

impl From<std::io::Error> for RealtimeError {
    fn from(error: std::io::Error) -> Self {
        RealtimeError::Io {
            message: error.to_string(),
        }
    }
}

impl From<reqwest::Error> for RealtimeError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            RealtimeError::timeout("health probe", 0)
        } else {
            RealtimeError::probe(error.to_string())
        }
    }
}

impl From<config::ConfigError> for RealtimeError {
    fn from(error: config::ConfigError) -> Self {
        RealtimeError::configuration(format!("failed to load configuration: {}", error), None)
    }
}
