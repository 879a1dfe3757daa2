// SPDX-License-Identifier: Apache-2.0

//! Retry with exponential backoff for retryable notification failures

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::config::RetrySettings;
use crate::error::SyncResult;
use crate::metrics;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Adds up to 25% random extra delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            multiplier: settings.multiplier,
            jitter: settings.jitter,
        }
    }
}

/// Final result of a retried operation
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: SyncResult<T>,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        let delay = Duration::from_secs_f64(base_delay.min(self.max_delay.as_secs_f64()));

        if self.jitter {
            let jitter_factor = 1.0 + rand::thread_rng().gen_range(0.0..0.25);
            Duration::from_secs_f64(delay.as_secs_f64() * jitter_factor)
        } else {
            delay
        }
    }

    /// Runs `f` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up
    pub async fn execute<F, Fut, T>(&self, mut f: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = f().await;
            let retry = matches!(&result, Err(e) if e.is_retryable());
            if !retry || attempt >= self.max_attempts {
                return Attempted {
                    result,
                    attempts: attempt,
                };
            }

            let delay = self.delay_for_attempt(attempt);
            debug!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Retrying after failure"
            );
            metrics::record_retry();
            sleep(delay).await;
        }
    }
}
