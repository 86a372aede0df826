//! Bounded retry with exponential backoff and jitter.
//!
//! [`RetryExecutor::execute`] wraps a fallible async thunk. Transient failures
//! are replayed up to [`RetryPolicy::max_attempts`] times in total; anything
//! the policy's predicate rejects is surfaced after the first attempt. The
//! delay after failed attempt `n` is `min(max_delay, base_delay * 2^(n-1))`,
//! perturbed by up to `jitter_fraction` of itself in either direction and
//! clamped to `[0, max_delay]`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::cancel::CancelSignal;
use crate::error::ApiError;

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay after the first failed attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Default ceiling for any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
/// Default jitter as a fraction of the computed delay.
pub const DEFAULT_JITTER_FRACTION: f64 = 0.5;

/// Decides whether an error is worth another attempt.
pub type RetryPredicate = fn(&ApiError) -> bool;

/// Retry budget and delay shape.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first. Values below one are
    /// treated as one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Ceiling for every delay, jittered or server-supplied.
    pub max_delay: Duration,
    /// Jitter as a fraction of the delay, clamped to `[0, 1]`.
    pub jitter_fraction: f64,
    /// Errors for which this predicate returns `false` are never retried.
    pub retryable: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_fraction: DEFAULT_JITTER_FRACTION,
            retryable: ApiError::is_transient,
        }
    }
}

impl RetryPolicy {
    /// Overrides the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Overrides the base and maximum delays.
    #[must_use]
    pub const fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Overrides the jitter fraction.
    #[must_use]
    pub const fn with_jitter(mut self, jitter_fraction: f64) -> Self {
        self.jitter_fraction = jitter_fraction;
        self
    }

    /// Overrides the retry predicate.
    #[must_use]
    pub const fn with_predicate(mut self, retryable: RetryPredicate) -> Self {
        self.retryable = retryable;
        self
    }

    /// Returns the un-jittered delay after failed attempt `attempt`
    /// (1-indexed). Non-decreasing in `attempt` and never above `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 1_u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Returns the jittered delay after failed attempt `attempt`.
    pub fn jittered_delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let delay = self.backoff_delay(attempt);
        let fraction = if self.jitter_fraction.is_finite() {
            self.jitter_fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let spread = delay.mul_f64(rng.gen_range(0.0..=fraction));
        let jittered = if rng.gen_bool(0.5) {
            delay.saturating_add(spread)
        } else {
            delay.saturating_sub(spread)
        };
        jittered.min(self.max_delay)
    }

    /// Returns the delay to wait after `error` ended attempt `attempt`.
    ///
    /// A server-supplied retry hint replaces the computed delay but is still
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, error: &ApiError, rng: &mut impl Rng) -> Duration {
        match error {
            ApiError::Transient {
                retry_after: Some(hint),
                ..
            } => (*hint).min(self.max_delay),
            _ => self.jittered_delay(attempt, rng),
        }
    }
}

/// Receives a callback before every retry delay.
pub trait RetryObserver: Send + Sync {
    /// Called after failed attempt `attempt`, before sleeping for `delay`.
    fn on_retry(&self, attempt: u32, delay: Duration, error: &ApiError);
}

/// Observer that logs each retry as a warning.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_retry(&self, attempt: u32, delay: Duration, error: &ApiError) {
        warn!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            kind = error.kind().as_str(),
            "retrying after error: {error}"
        );
    }
}

/// Runs thunks under a [`RetryPolicy`], honouring a cancellation signal
/// between and during attempts.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    observer: Arc<dyn RetryObserver>,
    cancel: CancelSignal,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    /// Creates an executor that logs retries through `tracing`.
    #[must_use]
    pub fn new(policy: RetryPolicy, cancel: CancelSignal) -> Self {
        Self {
            policy,
            observer: Arc::new(TracingObserver),
            cancel,
        }
    }

    /// Replaces the retry observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the active policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the cancellation signal shared with callers.
    #[must_use]
    pub const fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Invokes `thunk` until it succeeds, fails permanently, or exhausts the
    /// attempt budget.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `thunk` unchanged, or
    /// [`ApiError::Cancelled`] when the signal fires first.
    pub async fn execute<F, Fut, T>(&self, mut thunk: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let error = match self.cancel.run(thunk()).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if attempt >= max_attempts || !(self.policy.retryable)(&error) {
                return Err(error);
            }
            let delay = self.policy.delay_for(attempt, &error, &mut rand::thread_rng());
            self.observer.on_retry(attempt, delay, &error);
            self.cancel.sleep(delay).await?;
            attempt += 1;
        }
    }
}
