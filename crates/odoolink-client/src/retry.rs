use odoolink_common::protocol::error::{ErrorKind, OdooError, Result};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

use crate::client::OdooClient;

/// Retry logic with exponential backoff.
///
/// A failed attempt is retried when its error kind is listed in
/// `retryable_kinds` and attempts remain. The wait before retry `i`
/// (0-based) is `backoff_factor * 2^i`, capped at `max_backoff`. Delays are
/// deterministic; no jitter is applied.
///
/// The policy holds no per-call state, so one value can be cloned into any
/// number of call sites.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    ///
    /// Values below 1 behave as 1.
    /// Default: 3
    pub max_retries: u32,
    /// Base wait between attempts
    ///
    /// Default: 1 second
    pub backoff_factor: Duration,
    /// Upper bound for a single wait
    ///
    /// Default: 30 seconds
    pub max_backoff: Duration,
    /// Error kinds worth another attempt
    ///
    /// Default: `Connection`, `Timeout`
    pub retryable_kinds: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            retryable_kinds: vec![ErrorKind::Connection, ErrorKind::Timeout],
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_factor: Duration) -> Self {
        Self {
            max_retries,
            backoff_factor,
            ..Self::default()
        }
    }

    /// Replaces the set of retryable kinds.
    pub fn with_retryable_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable_kinds = kinds.into_iter().collect();
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Wait before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let multiplier = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.backoff_factor
            .checked_mul(multiplier)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }

    pub fn is_retryable(&self, err: &OdooError) -> bool {
        !err.is_max_retries_exceeded() && self.retryable_kinds.contains(&err.kind())
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error or
    /// runs out of attempts.
    ///
    /// # Errors
    ///
    /// - the first non-retryable error, unchanged
    /// - [`OdooError::MaxRetriesExceeded`] wrapping the last error once
    ///   `max_retries` attempts have failed
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute(op, None).await
    }

    /// Calls `model.method` through `client`, retrying transient failures.
    ///
    /// A failure that signals an expired session drops the client's session
    /// and is retried at once, so the next attempt authenticates again.
    pub async fn call(
        &self,
        client: &OdooClient,
        model: &str,
        method: &str,
        args: &Value,
        kwargs: &Value,
    ) -> Result<Value> {
        self.execute(
            || client.call(model, method, args.clone(), kwargs.clone()),
            Some(client),
        )
        .await
    }

    async fn execute<T, F, Fut>(&self, mut op: F, client: Option<&OdooClient>) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let reauthenticate = client.is_some() && err.is_session_expired();
            if !reauthenticate && !self.is_retryable(&err) {
                return Err(err);
            }

            if attempt >= max_attempts {
                tracing::warn!(attempts = attempt, error = %err, "giving up");
                return Err(OdooError::MaxRetriesExceeded {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            if let Some(client) = client.filter(|_| reauthenticate) {
                tracing::warn!(
                    instance = %client.instance_id(),
                    attempt,
                    "session expired, re-authenticating"
                );
                client.invalidate_session().await;
                continue;
            }

            let delay = self.delay_for(attempt - 1);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Runs `op` under a one-off [`RetryPolicy`] with default retryable kinds.
pub async fn with_retry<T, F, Fut>(max_retries: u32, backoff_factor: Duration, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    RetryPolicy::new(max_retries, backoff_factor).run(op).await
}
