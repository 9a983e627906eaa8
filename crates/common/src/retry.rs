//! Bounded retry with a fixed delay between attempts.
//!
//! Only [`ModelError::Transient`] failures are retried; permanent failures
//! and the final transient failure surface to the caller unchanged. There is
//! no exponential backoff — model calls here are cheap enough that a fixed
//! delay with a hard attempt ceiling is sufficient.

use std::time::Duration;

use tracing::warn;

use crate::error::ModelError;

/// How many times to attempt a model call and how long to wait in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or exhausts the policy.
pub async fn retry_fixed<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, ModelError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %e, "transient model error, retrying");
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            },
            Err(e) => return Err(e),
        }
    }
}
