use anyhow::Result;
use common::RetryConfig;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::ResearchError;

/// Signal from the generation service that its quota is exhausted.
///
/// Only this error is retried; anything else is returned on the first attempt.
#[derive(Debug, Error)]
#[error("quota exhausted: {0}")]
pub struct QuotaExhausted(pub String);

/// Exponential backoff for quota exhaustion
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_millis),
            max_delay: Duration::from_millis(config.max_delay_millis),
        }
    }

    /// Single attempt, no retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before `attempt` (1-based); the first attempt is immediate.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run `op`, retrying with backoff while it fails with [`QuotaExhausted`].
///
/// Once `max_attempts` is used up the failure becomes
/// [`ResearchError::RateLimited`], which aborts the research run.
pub async fn retry_on_quota<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let backoff = policy.delay_before(attempt);
            info!("Retrying {} (attempt {}/{}) after {:?}...", what, attempt, max_attempts, backoff);
            tokio::time::sleep(backoff).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is::<QuotaExhausted>() => {
                warn!("{}: {}", what, e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(ResearchError::RateLimited { attempts: max_attempts }.into())
}
