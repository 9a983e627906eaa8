//! reqwest error classification shared by all HTTP providers.

use keepsake_common::ModelError;

/// Timeouts and connection failures are worth retrying; everything else
/// (TLS, request building, body decoding) is not.
pub fn classify_transport(e: reqwest::Error) -> ModelError {
    if e.is_timeout() || e.is_connect() {
        ModelError::Transient(e.to_string())
    } else {
        ModelError::Permanent(e.to_string())
    }
}
