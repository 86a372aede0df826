//! Apply one operation across many resource identifiers.
//!
//! A limit of one runs targets sequentially in input order. Larger limits
//! start a fixed pool of `min(limit, targets)` workers that drain a shared
//! queue and report back over a channel keyed by target id, so the outcome
//! map is only ever written by the collecting task. Every target ends up
//! with exactly one [`BatchOutcome`], including targets that were in flight
//! or never started when the batch was cancelled. Each operation runs on its
//! own task, so a panic is recorded as a failure for its target.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cancel::CancelSignal;
use crate::error::ApiError;

/// Worker count used when `--parallel` is given without `--workers`.
pub const DEFAULT_WORKERS: usize = 5;

/// Upper bound on parallel workers accepted from the command line.
pub const MAX_WORKERS: usize = 20;

/// Result of the operation for one target.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchOutcome<T> {
    /// The operation returned successfully.
    Succeeded(T),
    /// The operation failed; the original error is kept.
    Failed(ApiError),
    /// The batch was cancelled before this target finished.
    Cancelled,
}

impl<T> BatchOutcome<T> {
    fn from_result(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(value) => Self::Succeeded(value),
            Err(ApiError::Cancelled) => Self::Cancelled,
            Err(error) => Self::Failed(error),
        }
    }

    /// Short label for logs and rendered output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One operation applied to an ordered set of targets.
pub struct BatchJob<F> {
    targets: Vec<String>,
    concurrency_limit: usize,
    operation: F,
}

impl<F> BatchJob<F> {
    /// Creates a sequential job. Duplicate ids keep their first position.
    pub fn new<I, S>(targets: I, operation: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let targets = targets
            .into_iter()
            .map(Into::into)
            .filter(|id: &String| seen.insert(id.clone()))
            .collect();
        Self {
            targets,
            concurrency_limit: 1,
            operation,
        }
    }

    /// Sets the maximum number of operations in flight. Zero is treated as
    /// one.
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    /// Targets in execution order.
    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Maximum number of operations in flight.
    #[must_use]
    pub const fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }
}

/// Aggregate of every per-target outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchResult<T> {
    targets: Vec<String>,
    /// Outcome for every target id.
    pub outcomes: BTreeMap<String, BatchOutcome<T>>,
    /// Number of [`BatchOutcome::Succeeded`] entries.
    pub succeeded_count: usize,
    /// Number of [`BatchOutcome::Failed`] entries.
    pub failed_count: usize,
    /// Number of [`BatchOutcome::Cancelled`] entries.
    pub cancelled_count: usize,
}

impl<T> BatchResult<T> {
    fn assemble(targets: Vec<String>, mut outcomes: BTreeMap<String, BatchOutcome<T>>) -> Self {
        for id in &targets {
            outcomes
                .entry(id.clone())
                .or_insert(BatchOutcome::Cancelled);
        }
        let count = |label: &str| {
            outcomes
                .values()
                .filter(|outcome| outcome.label() == label)
                .count()
        };
        let succeeded_count = count("succeeded");
        let failed_count = count("failed");
        let cancelled_count = count("cancelled");
        Self {
            targets,
            outcomes,
            succeeded_count,
            failed_count,
            cancelled_count,
        }
    }

    /// Reports whether every target succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed_count == 0 && self.cancelled_count == 0
    }

    /// Iterates outcomes in the original target order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BatchOutcome<T>)> {
        self.targets
            .iter()
            .filter_map(|id| self.outcomes.get(id).map(|outcome| (id.as_str(), outcome)))
    }
}

/// Runs batch jobs under a shared cancellation signal.
#[derive(Clone, Debug, Default)]
pub struct BatchExecutor {
    cancel: CancelSignal,
}

impl BatchExecutor {
    /// Creates an executor observing `cancel`.
    #[must_use]
    pub const fn new(cancel: CancelSignal) -> Self {
        Self { cancel }
    }

    /// Runs `job` and returns one outcome per target.
    pub async fn run<F, Fut, T>(&self, job: BatchJob<F>) -> BatchResult<T>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
        T: Send + 'static,
    {
        if job.concurrency_limit <= 1 || job.targets.len() <= 1 {
            self.run_sequential(job).await
        } else {
            self.run_parallel(job).await
        }
    }

    async fn run_sequential<F, Fut, T>(&self, job: BatchJob<F>) -> BatchResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
        T: Send + 'static,
    {
        let mut outcomes = BTreeMap::new();
        for id in &job.targets {
            if self.cancel.is_cancelled() {
                break;
            }
            let outcome = attempt(&self.cancel, (job.operation)(id.clone())).await;
            log_outcome(id, &outcome);
            outcomes.insert(id.clone(), outcome);
        }
        BatchResult::assemble(job.targets, outcomes)
    }

    async fn run_parallel<F, Fut, T>(&self, job: BatchJob<F>) -> BatchResult<T>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
        T: Send + 'static,
    {
        let BatchJob {
            targets,
            concurrency_limit,
            operation,
        } = job;
        let operation = Arc::new(operation);
        let queue = Arc::new(Mutex::new(targets.iter().cloned().collect::<VecDeque<_>>()));
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();

        for _ in 0..concurrency_limit.min(targets.len()) {
            let operation = Arc::clone(&operation);
            let queue = Arc::clone(&queue);
            let sender = sender.clone();
            let cancel = self.cancel.clone();
            workers.spawn(async move {
                while !cancel.is_cancelled() {
                    let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                    let Some(id) = next else { break };
                    let outcome = attempt(&cancel, operation(id.clone())).await;
                    if sender.send((id, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(sender);

        let mut outcomes = BTreeMap::new();
        while let Some((id, outcome)) = receiver.recv().await {
            log_outcome(&id, &outcome);
            outcomes.insert(id, outcome);
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                warn!("batch worker ended abnormally: {err}");
            }
        }

        BatchResult::assemble(targets, outcomes)
    }
}

/// Runs one operation on its own task so a panic becomes that target's
/// failure instead of a lost outcome.
async fn attempt<Fut, T>(cancel: &CancelSignal, operation: Fut) -> BatchOutcome<T>
where
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    T: Send + 'static,
{
    let signal = cancel.clone();
    match tokio::spawn(async move { signal.run(operation).await }).await {
        Ok(result) => BatchOutcome::from_result(result),
        Err(err) if err.is_cancelled() => BatchOutcome::Cancelled,
        Err(err) => BatchOutcome::Failed(ApiError::Internal(format!("operation panicked: {err}"))),
    }
}

fn log_outcome<T>(id: &str, outcome: &BatchOutcome<T>) {
    match outcome {
        BatchOutcome::Failed(error) => {
            warn!(target_id = id, kind = error.kind().as_str(), "batch item failed: {error}");
        }
        BatchOutcome::Succeeded(_) | BatchOutcome::Cancelled => {
            info!(target_id = id, outcome = outcome.label(), "batch item finished");
        }
    }
}

#[cfg(test)]
mod tests;
