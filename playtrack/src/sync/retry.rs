use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use playtrack_core::{ApiErrorClass, SteamError};
use rand::Rng;

/// How a failed call should be treated by [`retry_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Back off exponentially, then try again.
    RateLimited,
    /// Stop immediately; the item resolves to its empty value.
    Terminal,
    /// Try again after the fixed retry delay.
    Retryable,
}

pub trait Classify {
    fn retry_class(&self) -> RetryClass;
}

impl Classify for SteamError {
    fn retry_class(&self) -> RetryClass {
        match self.classification() {
            Some(ApiErrorClass::RateLimit) => RetryClass::RateLimited,
            Some(ApiErrorClass::Forbidden) => RetryClass::Terminal,
            // Transient and permanent statuses alike get the fixed-delay retry;
            // the attempt budget bounds the cost of retrying a permanent one.
            Some(ApiErrorClass::Transient | ApiErrorClass::Permanent) | None => {
                RetryClass::Retryable
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self { base, max, jitter }
    }

    /// `base * 2^attempt`, capped at `max`. With jitter the delay is drawn
    /// uniformly from `0..=cap`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let cap = self
            .base
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max);
        if self.jitter {
            let millis = u64::try_from(cap.as_millis()).unwrap_or(u64::MAX);
            Duration::from_millis(rng.gen_range(0..=millis))
        } else {
            cap
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit: Backoff,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit: Backoff::new(Duration::from_secs(1), Duration::from_secs(64), false),
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

#[derive(Debug)]
pub enum Outcome<T, E> {
    Success(T),
    Terminal(E),
    Exhausted(E),
}

#[derive(Debug)]
pub struct Attempted<T, E> {
    pub outcome: Outcome<T, E>,
    pub attempts: u32,
    pub backoff_pauses: u32,
}

impl<T, E> Attempted<T, E> {
    pub fn ok(self) -> Option<T> {
        match self.outcome {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Runs `call` until it succeeds, hits a terminal error, or the policy's
/// attempt budget is spent.
pub async fn retry_call<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: impl Display,
    mut call: F,
) -> Attempted<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0u32;
    let mut backoff_pauses = 0u32;
    loop {
        let err = match call().await {
            Ok(value) => {
                return Attempted {
                    outcome: Outcome::Success(value),
                    attempts: attempts + 1,
                    backoff_pauses,
                };
            }
            Err(err) => err,
        };
        attempts += 1;

        let class = err.retry_class();
        if class == RetryClass::Terminal {
            return Attempted {
                outcome: Outcome::Terminal(err),
                attempts,
                backoff_pauses,
            };
        }
        if attempts >= max_attempts {
            return Attempted {
                outcome: Outcome::Exhausted(err),
                attempts,
                backoff_pauses,
            };
        }

        let delay = if class == RetryClass::RateLimited {
            backoff_pauses += 1;
            policy.rate_limit.delay(attempts - 1)
        } else {
            policy.retry_delay
        };
        tracing::warn!(
            "{label}: attempt {attempts}/{max_attempts} failed ({err}), retrying in {delay:?}"
        );
        tokio::time::sleep(delay).await;
    }
}
