//! Chat completion capability.

use {async_trait::async_trait, keepsake_common::ModelError};

/// A model that turns a (system, user) prompt pair into text.
///
/// Failures are a tagged [`ModelError`], never an error-shaped string mixed
/// into legitimate output — callers branch on the variant, not on substrings.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
    ) -> Result<String, ModelError>;

    /// Model used when the caller has no per-request override.
    fn default_model(&self) -> &str;
}
