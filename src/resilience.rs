//! Bounded timeouts and retry-with-backoff around collaborator calls.
//!
//! None of the external collaborators (extractor service, Ollama, Gemini, Qdrant) guarantee
//! bounded latency, so every call made by the orchestrators goes through [`call_with_policy`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Timeout and retry settings for one class of collaborator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Upper bound for a single attempt.
    pub timeout: Duration,
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every subsequent retry.
    pub initial_backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl CallPolicy {
    /// Policy with a single attempt and no backoff, used in tests.
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }
}

/// Failure of a policy-wrapped call.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The last attempt did not finish within the policy timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Name of the collaborator operation.
        operation: &'static str,
        /// Timeout applied to the attempt.
        after: Duration,
    },
    /// The collaborator returned an error on the last attempt.
    #[error("{0}")]
    Failed(E),
}

impl<E> CallError<E> {
    /// Whether the failure was a timeout rather than a collaborator error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Classification hook deciding whether a collaborator error is worth another attempt.
pub trait Retryable {
    /// Transient failures (unreachable endpoint, 5xx) return `true`.
    fn is_retryable(&self) -> bool;
}

/// Run `attempt` under the policy: each try is bounded by the timeout, transient errors and
/// timeouts are retried with exponential backoff.
pub async fn call_with_policy<T, E, F, Fut>(
    policy: &CallPolicy,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, CallError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut backoff = policy.initial_backoff;
    let mut tries = 0u32;

    loop {
        tries += 1;
        let outcome = match tokio::time::timeout(policy.timeout, attempt()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) => {
                if !error.is_retryable() {
                    return Err(CallError::Failed(error));
                }
                CallError::Failed(error)
            }
            Err(_) => CallError::Timeout {
                operation,
                after: policy.timeout,
            },
        };

        if tries > policy.max_retries {
            return Err(outcome);
        }

        tracing::warn!(
            operation,
            attempt = tries,
            backoff_ms = backoff.as_millis() as u64,
            error = %outcome_message(&outcome),
            "Collaborator call failed; retrying"
        );
        tokio::time::sleep(backoff).await;
        backoff = backoff.saturating_mul(2);
    }
}

fn outcome_message<E: Display>(error: &CallError<E>) -> String {
    match error {
        CallError::Timeout { operation, after } => format!("{operation} timed out after {after:?}"),
        CallError::Failed(inner) => inner.to_string(),
    }
}
