//! Error types for sip-event-core

use thiserror::Error;

/// Result type for SIP event operations
pub type Result<T> = std::result::Result<T, SipEventError>;

/// Errors raised by stores, collaborators and configuration loading.
///
/// Reconcilers never hand these to their callers; they are logged and turned
/// into a `NothingChanged` result at the reconciler boundary.
#[derive(Debug, Error)]
pub enum SipEventError {
    /// A store operation failed
    #[error("Store error during {operation}: {message}")]
    Store { operation: String, message: String },

    /// Call not found
    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Invalid SIP URI: {0}")]
    InvalidSipUri(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl SipEventError {
    /// Create a store error
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<toml::de::Error> for SipEventError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for SipEventError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
