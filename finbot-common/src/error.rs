//! Error types for FinBot services.

use thiserror::Error;

/// Result type alias using the FinBot error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for FinBot services.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Referenced resource (usually a session) does not exist
    #[error("{0}")]
    NotFound(String),

    /// Malformed or empty request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The remote completion service failed
    #[error("{0}")]
    Upstream(String),

    /// The remote completion service did not answer in time
    #[error("Upstream request timed out after {0}s")]
    Timeout(u64),

    /// Turn bookkeeping was violated (double reply, bad index)
    #[error("Internal consistency error: {0}")]
    Consistency(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error came from the completion service.
    pub fn is_upstream(&self) -> bool {
        match self {
            Self::Upstream(_) | Self::Timeout(_) => true,
            Self::WithContext { source, .. } => source.is_upstream(),
            _ => false,
        }
    }

    /// Get HTTP status code for this error.
    ///
    /// Upstream failures surface as 500 to the browser, not 502/504.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidInput(_) => 400,
            Self::WithContext { source, .. } => source.status_code(),
            _ => 500,
        }
    }
}
