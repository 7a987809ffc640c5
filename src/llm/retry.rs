//! Retry with exponential backoff and jitter.
//!
//! Every backend goes through [`run_with_retry`]; what differs is the policy.
//! Only transient failures (5xx, connect, timeout) are retried.

use super::BackendError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How often and how patiently a request is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub base_delay: Duration,
    /// Add a random `[0, 1)` second jitter to each delay.
    pub jitter: bool,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_for(retry);
        if self.jitter {
            base + Duration::from_secs_f64(jitter_fraction())
        } else {
            base
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            jitter: true,
        }
    }
}

/// Uniform value in `[0, 1)` from the random bits of a v4 UUID.
fn jitter_fraction() -> f64 {
    const MANTISSA_BITS: u32 = 53;
    let bits = uuid::Uuid::new_v4().as_u128() & ((1u128 << MANTISSA_BITS) - 1);
    bits as f64 / (1u64 << MANTISSA_BITS) as f64
}

/// Per-call retry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub max_attempts: u32,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn has_next(&self) -> bool {
        self.attempt + 1 < self.max_attempts
    }

    pub fn advance(&mut self) {
        self.attempt += 1;
    }
}

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy is exhausted.
///
/// `op` receives the zero-based attempt number.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> Result<T, BackendError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut state = RetryState::new(policy.max_attempts);

    loop {
        debug!("Attempt {}/{}", state.attempt + 1, state.max_attempts);
        match op(state.attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && state.has_next() => {
                let delay = policy.delay_for(state.attempt + 1);
                warn!(
                    "Attempt {}/{} failed: {}; retrying in {:.2}s",
                    state.attempt + 1,
                    state.max_attempts,
                    err,
                    delay.as_secs_f64()
                );
                sleeper.sleep(delay).await;
                state.advance();
            }
            Err(err) if err.is_transient() && state.attempt > 0 => {
                return Err(err.after_attempts(state.attempt + 1));
            }
            Err(err) => return Err(err),
        }
    }
}
