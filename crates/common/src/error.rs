//! Error taxonomy for external model calls.
//!
//! Every embedding / completion / vision call ends in one of two buckets:
//! transient (worth retrying: timeouts, connect failures, 429, 5xx) or
//! permanent (bad request, auth failure, malformed response). Callers branch
//! on the variant instead of matching substrings in a sentinel string.

/// Failure of an outbound model call.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Network-level or rate-limit failure; a retry may succeed.
    #[error("transient model error: {0}")]
    Transient(String),

    /// Failure that will not be fixed by retrying.
    #[error("model request failed: {0}")]
    Permanent(String),
}

impl ModelError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classify an HTTP status code. 429 and all 5xx are transient.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let msg = format!("HTTP {status}: {}", body.into());
        if status == 429 || status >= 500 {
            Self::Transient(msg)
        } else {
            Self::Permanent(msg)
        }
    }
}
