use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::store::{StoreError, StoreResult};

/// Bounds on store calls: a per-call timeout, and how hard to retry the calls
/// that are allowed to be retried (ledger appends and compensations).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_millis(50),
            call_timeout: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Run a single store call, failing with [`StoreError::Timeout`] if it
    /// does not finish within `call_timeout`.
    pub async fn call<T>(self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.call_timeout))?
    }

    /// Retry `op` while it fails with an error `transient` accepts, sleeping
    /// with doubling backoff between attempts. Returns the last error once
    /// `attempts` are used up.
    pub async fn retry<T, E, F, Fut>(
        self,
        operation: &'static str,
        mut op: F,
        transient: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts && transient(&e) => {
                    warn!(operation, attempt, error = %e, "store call failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// [`retry`](Self::retry) for a plain store call, with the per-call timeout.
    pub async fn retry_store<T, F, Fut>(self, operation: &'static str, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        self.retry(operation, move || self.call(op()), |_: &StoreError| true)
            .await
    }
}

/// Treat a duplicate insert as success: an earlier attempt that reported a
/// failure may still have landed.
pub fn landed(result: StoreResult<()>) -> StoreResult<()> {
    match result {
        Err(StoreError::Duplicate(_)) => Ok(()),
        other => other,
    }
}
