use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{ClusterError, Result};

const JITTER_MS: u64 = 50;

/// Exponential backoff for the "retry until success" loops: write forwarding,
/// secondary fan-out and replica configuration.
///
/// Only errors for which [`ClusterError::is_retryable`] holds are retried.
/// `max_attempts = None` keeps going until success or shutdown.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: Option<usize>,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::until_success(Duration::from_millis(150), Duration::from_millis(1200))
    }
}

impl RetryPolicy {
    pub fn until_success(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: None,
            base_delay,
            max_delay,
        }
    }

    pub fn bounded(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            base_delay,
            max_delay,
        }
    }

    /// `0` attempts means unlimited, matching the CLI flag.
    pub fn from_flags(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        let base = Duration::from_millis(base_delay_ms);
        let max = Duration::from_millis(max_delay_ms.max(base_delay_ms));
        if max_attempts == 0 {
            Self::until_success(base, max)
        } else {
            Self::bounded(max_attempts, base, max)
        }
    }

    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }

    /// Delay after the `attempt`-th failure (1-based), before jitter.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let delay = self.backoff(attempt);
        if delay.is_zero() {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..JITTER_MS))
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, runs out
    /// of attempts or `shutdown` flips to `true`.
    pub async fn run<T, F, Fut>(
        &self,
        what: &str,
        shutdown: &watch::Receiver<bool>,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut shutdown = shutdown.clone();
        let mut attempt = 0;

        loop {
            if *shutdown.borrow() {
                return Err(ClusterError::Cancelled);
            }
            attempt += 1;

            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if let Some(max) = self.max_attempts
                && attempt >= max
            {
                tracing::warn!("{} failed after {} attempts: {}", what, attempt, err);
                return Err(ClusterError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.delay_for_attempt(attempt);
            tracing::warn!(
                "{} failed (attempt {}): {}. Retrying in {:?}",
                what,
                attempt,
                err,
                delay
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancelled(&mut shutdown) => return Err(ClusterError::Cancelled),
            }
        }
    }
}

/// Resolves once the shutdown flag is set. Never resolves if the sender is
/// gone without having signalled.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
