//! Bounded exponential-backoff retry for a single unit of work.

use crate::error::{PodscribeError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How often and how patiently a failing call is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_factor,
        }
    }

    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    /// Sleep before the attempt following attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(0.0).powi(attempt as i32);
        self.initial_delay.mul_f64(factor)
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Run `op` until it succeeds, fails with an error `should_retry` rejects,
    /// or the attempts run out. The last error is returned on exhaustion.
    ///
    /// `op` receives the 0-based attempt number.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        label: &str,
        should_retry: P,
        mut op: F,
    ) -> std::result::Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let attempts = self.attempts();
        let mut attempt = 0;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{} succeeded on attempt {}", label, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if !should_retry(&e) {
                        debug!("{} failed with non-retriable error: {}", label, e);
                        return Err(e);
                    }
                    if attempt + 1 >= attempts {
                        warn!("{} failed after {} attempts: {}", label, attempts, e);
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} attempt {} failed: {}. Retrying in {:?}",
                        label,
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// [`RetryPolicy::run`] retrying only transient errors.
    pub async fn run_transient<T, F, Fut>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(label, PodscribeError::is_transient, op).await
    }
}
