//! Bounded retry with exponential backoff

use crate::config::RetryConfig;
use crate::error::ProbeError;
use mcp_health_logging::{StructuredContext, StructuredLogger};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, max_retries: u32) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_retries,
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(31));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, ProbeError>,
    /// Attempts actually issued
    pub attempts: u32,
    /// Duration of the last attempt
    pub latency: Duration,
    /// Backoff delays slept between attempts
    pub delays: Vec<Duration>,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the retry budget is spent
///
/// Every attempt is bounded by `timeout`. Cancellation aborts the in-flight
/// attempt as well as any pending backoff.
pub async fn run_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    timeout: Duration,
    cancel: &CancellationToken,
    ctx: &StructuredContext,
    endpoint: &str,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProbeError>>,
{
    let mut attempts = 0;
    let mut delays = Vec::new();
    let mut ctx = ctx.clone();

    loop {
        if cancel.is_cancelled() {
            return RetryOutcome {
                result: Err(ProbeError::cancelled()),
                attempts,
                latency: Duration::ZERO,
                delays,
            };
        }

        attempts += 1;
        StructuredLogger::log_probe_start(&ctx, endpoint);
        let started = Instant::now();
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(ProbeError::cancelled()),
            outcome = tokio::time::timeout(timeout, operation(attempts)) => {
                outcome.unwrap_or_else(|_| Err(ProbeError::timeout(timeout)))
            }
        };
        let latency = started.elapsed();
        StructuredLogger::log_probe_end(&ctx, result.is_ok(), result.as_ref().err());

        let retry = attempts - 1;
        let reason = match &result {
            Err(error) if error.is_retryable() && retry < policy.max_retries => {
                Some(error.to_string())
            }
            _ => None,
        };
        let Some(reason) = reason else {
            return RetryOutcome {
                result,
                attempts,
                latency,
                delays,
            };
        };

        let delay = policy.delay_for(retry);
        StructuredLogger::log_retry(&ctx, delay, &reason);
        delays.push(delay);
        tokio::select! {
            _ = cancel.cancelled() => {
                return RetryOutcome {
                    result: Err(ProbeError::cancelled()),
                    attempts,
                    latency,
                    delays,
                };
            }
            _ = tokio::time::sleep(delay) => {}
        }
        ctx = ctx.next_attempt();
    }
}
