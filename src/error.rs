//! Muninn error types

use std::time::Duration;

/// Muninn error types.
///
/// `Clone` is required: a single upstream outcome is fanned out verbatim to
/// every caller coalesced onto the same in-flight request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MuninnError {
    // Upstream/network errors
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("upstream call exceeded deadline of {0:?}")]
    Timeout(Duration),

    // Data errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Fetched bytes are not a recognized image format.
    #[error("image decode error: {0}")]
    Decode(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MuninnError {
    /// Whether this error came from the upstream API rather than from
    /// local configuration or decoding.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            MuninnError::NotFound(_)
                | MuninnError::Upstream { .. }
                | MuninnError::Http(_)
                | MuninnError::Timeout(_)
        )
    }
}

// Hand-rolled rather than #[from]: reqwest::Error and serde_json::Error are
// not Clone, so only their rendered messages are carried.
impl From<reqwest::Error> for MuninnError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // The configured deadline is not recoverable from the error
            // itself; the fetcher re-wraps with the real value.
            MuninnError::Timeout(Duration::ZERO)
        } else {
            MuninnError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MuninnError {
    fn from(err: serde_json::Error) -> Self {
        MuninnError::Json(err.to_string())
    }
}

/// Result type alias for Muninn operations
pub type Result<T> = std::result::Result<T, MuninnError>;
