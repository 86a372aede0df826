//! Wait-until-condition engine for asynchronous resource transitions.
//!
//! [`Poller::wait_for`] drives a small state machine. Each tick fetches the
//! resource through the retry executor and then moves to
//! [`PollState::Succeeded`] when the predicate holds, [`PollState::Failed`]
//! when the status is terminal, or [`PollState::TimedOut`] once the deadline
//! passes. Otherwise it sleeps and ticks again. Cancellation is checked before
//! every fetch and every sleep.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::resource::Resource;
use crate::retry::RetryExecutor;

/// Default delay between fetches.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default upper bound on a single wait.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Longest wait accepted from configuration.
pub const MAX_WAIT_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Pod statuses from which a pod never reaches `RUNNING` by itself.
pub const POD_TERMINAL_STATES: [&str; 2] = ["EXITED", "TERMINATED"];

/// Condition evaluated against each fetched resource.
pub type PollPredicate = Arc<dyn Fn(&Resource) -> bool + Send + Sync>;

/// States of a single wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollState {
    /// Still fetching.
    Polling,
    /// The predicate held.
    Succeeded,
    /// The deadline passed first.
    TimedOut,
    /// The resource reached a terminal-failure status.
    Failed,
}

/// Errors raised when building a [`PollSpec`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PollSpecError {
    /// The interval between fetches must be positive.
    #[error("poll interval must be greater than zero")]
    ZeroInterval,
}

/// What to wait for and how long to keep trying.
#[derive(Clone)]
pub struct PollSpec {
    predicate: PollPredicate,
    poll_interval: Duration,
    timeout: Duration,
    terminal_failure_states: BTreeSet<String>,
}

impl fmt::Debug for PollSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollSpec")
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .field("terminal_failure_states", &self.terminal_failure_states)
            .finish_non_exhaustive()
    }
}

impl PollSpec {
    /// Builds a spec from a predicate and timing.
    ///
    /// # Errors
    ///
    /// Returns [`PollSpecError::ZeroInterval`] when `poll_interval` is zero.
    pub fn new(
        predicate: PollPredicate,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Self, PollSpecError> {
        if poll_interval.is_zero() {
            return Err(PollSpecError::ZeroInterval);
        }
        Ok(Self {
            predicate,
            poll_interval,
            timeout,
            terminal_failure_states: BTreeSet::new(),
        })
    }

    /// Adds statuses that end the wait with a failure.
    #[must_use]
    pub fn with_terminal_states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terminal_failure_states
            .extend(states.into_iter().map(Into::into));
        self
    }

    /// Waits for a pod to be `RUNNING` with at least one exposed port.
    ///
    /// # Errors
    ///
    /// Returns [`PollSpecError::ZeroInterval`] when `poll_interval` is zero.
    pub fn pod_running(poll_interval: Duration, timeout: Duration) -> Result<Self, PollSpecError> {
        let spec = Self::new(Arc::new(pod_is_running), poll_interval, timeout)?;
        Ok(spec.with_terminal_states(POD_TERMINAL_STATES))
    }

    /// Waits for an endpoint health check to report a ready worker.
    ///
    /// The fetched resource must come from the health action, not from a
    /// plain `get`.
    ///
    /// # Errors
    ///
    /// Returns [`PollSpecError::ZeroInterval`] when `poll_interval` is zero.
    pub fn endpoint_healthy(
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Self, PollSpecError> {
        Self::new(Arc::new(endpoint_is_healthy), poll_interval, timeout)
    }

    /// Interval between fetches.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Upper bound on the wait.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the state implied by one fetched resource, ignoring time.
    #[must_use]
    pub fn evaluate(&self, resource: &Resource) -> PollState {
        if (self.predicate)(resource) {
            PollState::Succeeded
        } else if self.terminal_failure_states.contains(&resource.status) {
            PollState::Failed
        } else {
            PollState::Polling
        }
    }

    /// Returns the state after `elapsed` time spent waiting. A resource that
    /// is still polling once the timeout has passed is [`PollState::TimedOut`].
    #[must_use]
    pub fn evaluate_at(&self, resource: &Resource, elapsed: Duration) -> PollState {
        match self.evaluate(resource) {
            PollState::Polling if elapsed >= self.timeout => PollState::TimedOut,
            state => state,
        }
    }

    /// Time left before the timeout, or zero once it has passed.
    const fn remaining(&self, elapsed: Duration) -> Duration {
        self.timeout.saturating_sub(elapsed)
    }
}

fn pod_is_running(resource: &Resource) -> bool {
    resource.status == "RUNNING"
        && resource
            .attribute("runtime.ports")
            .and_then(serde_json::Value::as_array)
            .is_some_and(|ports| !ports.is_empty())
}

fn endpoint_is_healthy(resource: &Resource) -> bool {
    resource
        .attribute("workers.ready")
        .and_then(serde_json::Value::as_u64)
        .is_some_and(|ready| ready >= 1)
}

/// Runs waits using a shared retry executor.
#[derive(Clone, Debug)]
pub struct Poller {
    retry: RetryExecutor,
}

impl Poller {
    /// Creates a poller whose fetches go through `retry`.
    #[must_use]
    pub const fn new(retry: RetryExecutor) -> Self {
        Self { retry }
    }

    /// Polls `fetch` until `spec` is satisfied, fails, or times out.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::TerminalState`] when a terminal status is observed,
    /// [`ApiError::Timeout`] when the deadline passes, [`ApiError::Cancelled`]
    /// when the signal fires, or the fetch error once retries are exhausted.
    pub async fn wait_for<F, Fut>(
        &self,
        resource_id: &str,
        mut fetch: F,
        spec: &PollSpec,
    ) -> Result<Resource, ApiError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<Resource, ApiError>>,
    {
        let cancel = self.retry.cancel_signal();
        let started = Instant::now();
        let mut last_status: Option<String> = None;

        loop {
            cancel.check()?;
            let resource = self
                .retry
                .execute(|| fetch(resource_id.to_owned()))
                .await?;

            if last_status.as_deref() != Some(resource.status.as_str()) {
                info!(resource_id, status = %resource.status, "status changed");
                last_status = Some(resource.status.clone());
            }

            let elapsed = started.elapsed();
            match spec.evaluate_at(&resource, elapsed) {
                PollState::Succeeded => return Ok(resource),
                PollState::Failed => {
                    return Err(ApiError::TerminalState {
                        resource_id: resource_id.to_owned(),
                        state: resource.status,
                    });
                }
                PollState::TimedOut => {
                    return Err(ApiError::Timeout {
                        resource_id: resource_id.to_owned(),
                        elapsed,
                        last_status: resource.status,
                    });
                }
                PollState::Polling => {}
            }

            let pause = spec.poll_interval.min(spec.remaining(elapsed));
            debug!(resource_id, ?pause, "waiting before next poll");
            cancel.sleep(pause).await?;
        }
    }
}
