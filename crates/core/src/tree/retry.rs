//! Bounded retry of whole transactions.
//!
//! Each attempt runs in its own transaction. A [`TreeError::Conflict`]
//! rolls back, sleeps a jittered backoff, and tries again. Anything else
//! rolls back and returns, so a failed operation never leaves partial
//! writes behind. A closed gap between neighbours is not seen here:
//! placement rebalances inside the attempt's own transaction.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::tree::error::TreeError;
use crate::tree::store::{NodeStore, NodeTx};

/// Default number of attempts per operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default lower bound of the jittered backoff.
pub const DEFAULT_BACKOFF_MIN: Duration = Duration::from_millis(100);

/// Default upper bound of the jittered backoff.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_min: DEFAULT_BACKOFF_MIN,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl RetryPolicy {
    /// Pick a backoff uniformly from `[backoff_min, backoff_max]`.
    pub fn jitter(&self) -> Duration {
        let min = self.backoff_min.as_millis() as u64;
        let max = self.backoff_max.as_millis() as u64;
        if max <= min {
            return self.backoff_min;
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// One unit of work the retry loop runs inside a transaction.
#[async_trait]
pub trait Attempt<T: NodeTx>: Send + Sync {
    type Output: Send;

    /// Operation name for logs.
    fn name(&self) -> &'static str;

    async fn run(&self, tx: &mut T) -> Result<Self::Output, TreeError>;
}

/// Run `attempt` until it commits, fails for good, or the budget runs out.
pub async fn run_with_retry<S, A>(
    store: &S,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    attempt: &A,
) -> Result<A::Output, TreeError>
where
    S: NodeStore,
    A: Attempt<S::Tx>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last: Option<TreeError> = None;

    for n in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(TreeError::Cancelled);
        }

        let mut tx = store.begin().await?;
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TreeError::Cancelled),
            r = attempt.run(&mut tx) => r,
        };

        let err = match result {
            Ok(output) => match tx.commit().await {
                Ok(()) => return Ok(output),
                Err(err) => err,
            },
            Err(err) => {
                tx.rollback().await?;
                err
            }
        };

        if !err.is_retryable() {
            return Err(err);
        }

        if n < max_attempts {
            let backoff = policy.jitter();
            tracing::warn!(
                operation = attempt.name(),
                attempt = n,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Sort weight conflict, retrying"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TreeError::Cancelled),
                () = tokio::time::sleep(backoff) => {}
            }
        }
        last = Some(err);
    }

    let last = last.unwrap_or_else(|| TreeError::Internal("No attempt was made".to_string()));
    tracing::warn!(
        operation = attempt.name(),
        attempts = max_attempts,
        error = %last,
        "Retry budget exhausted"
    );
    Err(TreeError::RetriesExhausted {
        attempts: max_attempts,
        last: Box::new(last),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
