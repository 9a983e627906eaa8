//! Shared plumbing for model-backed services: the model-call error taxonomy,
//! a bounded fixed-delay retry helper, and OpenAI-compatible endpoint
//! derivation used by every outbound provider.

pub mod endpoint;
pub mod error;
pub mod retry;

pub use {
    error::ModelError,
    retry::{RetryPolicy, retry_fixed},
};
