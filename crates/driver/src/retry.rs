//! The `retry` module contains the bounded retry combinator wrapped around every chain call.

use op_reputation_analyzer::AnalyzerError;
use std::{future::Future, time::Duration};

/// The [RetryPolicy] struct parameterizes [with_retry].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The total number of attempts, including the first one.
    pub max_attempts: u32,
    /// The fixed delay awaited before every attempt.
    pub delay: Duration,
}

impl RetryPolicy {
    /// A policy that retries a transient failure exactly once.
    pub const fn single_retry(delay: Duration) -> Self {
        Self {
            max_attempts: 2,
            delay,
        }
    }
}

/// Runs `op` under the given [RetryPolicy].
///
/// The policy's delay is awaited before every attempt, which doubles as the inter-request rate
/// limit. Only [AnalyzerError::TransientFetch] errors are retried; any other error, or the last
/// transient one, is returned as-is.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, AnalyzerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AnalyzerError>>,
{
    let mut attempt = 1;
    loop {
        tokio::time::sleep(policy.delay).await;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                tracing::warn!(target: "retry", "{} failed (attempt {}/{}): {}. Retrying in {:?}...", label, attempt, policy.max_attempts, e, policy.delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
