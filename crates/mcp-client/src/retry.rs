//! Retry with exponential backoff, and timeout racing.
//!
//! [`RetryPolicy`] is transport-agnostic: it only sees operations that
//! resolve to `Result<T, ClassifiedError>` and consults the error's
//! `retryable` flag. The plain policy doubles its delay without jitter; the
//! reconnect policy adds an 80% to 120% jitter band and can be cut short by a
//! [`CancellationToken`].

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tp_domain::config::ConnectionConfig;
use tp_domain::trace::TraceEvent;

use crate::error::ClassifiedError;

/// Scales a capped delay. Returns a multiplier, normally close to `1.0`.
pub type Jitter = fn() -> f64;

/// Uniform multiplier in `[0.8, 1.2]`.
pub fn jitter_band() -> f64 {
    0.8 + rand::random::<f64>() * 0.4
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RetryPolicy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total invocations, including the first.
    pub max_attempts: u32,
    /// Wait after the first failure; doubles for each further failure.
    pub base_delay: Duration,
    /// Ceiling applied before jitter.
    pub max_delay: Duration,
    pub jitter: Option<Jitter>,
    /// Cancels pending waits. A cancelled wait ends the run with an error.
    pub cancel: Option<CancellationToken>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter: None,
            cancel: None,
        }
    }
}

impl RetryPolicy {
    /// Jittered policy used by `ConnectionManager::reconnect`.
    pub fn reconnect(cfg: &ConnectionConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: cfg.retry_delay(),
            max_delay: cfg.max_delay(),
            jitter: Some(jitter_band),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Delay after the given failed attempt (1-based):
    /// `min(base * 2^(attempt-1), max)`, then jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let capped = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        match self.jitter {
            Some(jitter) => capped.mul_f64(jitter().max(0.0)),
            None => capped,
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of attempts. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, name: &str, operation: F) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        self.run_with_callback(name, operation, |_, _| {}).await
    }

    /// Like [`run`](Self::run), calling `on_retry(attempt, &error)` after
    /// each backoff wait and before the next attempt.
    pub async fn run_with_callback<T, F, Fut, R>(
        &self,
        name: &str,
        mut operation: F,
        mut on_retry: R,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
        R: FnMut(u32, &ClassifiedError),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.retryable {
                return Err(err);
            }
            if attempt >= max_attempts {
                tracing::warn!(
                    operation = name,
                    attempts = attempt,
                    error = %err,
                    "retries exhausted"
                );
                return Err(err);
            }

            let delay = self.delay_for_attempt(attempt);
            tracing::warn!(
                operation = name,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "operation failed, retrying"
            );
            TraceEvent::RetryScheduled {
                operation: name.to_owned(),
                attempt,
                delay_ms: delay.as_millis() as u64,
                error: err.to_string(),
            }
            .emit();

            self.wait(name, delay).await?;
            on_retry(attempt, &err);
            attempt += 1;
        }
    }

    async fn wait(&self, name: &str, delay: Duration) -> Result<(), ClassifiedError> {
        let Some(token) = &self.cancel else {
            tokio::time::sleep(delay).await;
            return Ok(());
        };
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = token.cancelled() => {
                tracing::debug!(operation = name, "pending retry cancelled");
                Err(ClassifiedError::connection(format!(
                    "{name} cancelled while waiting to retry"
                ))
                .with_retryable(false))
            }
        }
    }
}

/// [`RetryPolicy::run`] as a free function.
pub async fn with_retry<T, F, Fut>(
    name: &str,
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, ClassifiedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClassifiedError>>,
{
    policy.run(name, operation).await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Timeout racing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Race `future` against a `bound` timer.
///
/// The future runs on its own task. When the timer wins the task is
/// detached, not aborted: it keeps running and its result is dropped.
pub async fn with_timeout<T, Fut>(future: Fut, bound: Duration, name: &str) -> Result<T, ClassifiedError>
where
    Fut: Future<Output = Result<T, ClassifiedError>> + Send + 'static,
    T: Send + 'static,
{
    let mut handle = tokio::spawn(future);
    match tokio::time::timeout(bound, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(ClassifiedError::protocol(format!(
            "{name} terminated abnormally: {join_err}"
        ))),
        Err(_) => {
            tracing::debug!(
                operation = name,
                bound_ms = bound.as_millis() as u64,
                "operation timed out, late completion will be ignored"
            );
            Err(ClassifiedError::timeout(name, bound))
        }
    }
}
