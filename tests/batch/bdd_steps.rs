//! BDD step definitions for batch execution.

use rpctl::{BatchExecutor, BatchJob, BatchOutcome, BatchResult};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Builder;

use super::test_helpers::BatchContext;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn split_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect()
}

fn result_of(batch_context: &BatchContext) -> Result<BatchResult<String>, StepError> {
    batch_context
        .with_state(|state| state.result.clone())
        .ok_or_else(|| StepError::Assertion(String::from("the batch has not run")))
}

fn as_count(value: u32) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[given("a batch over targets \"{targets}\"")]
fn batch_over_targets(batch_context: &BatchContext, targets: String) {
    batch_context.with_state(|state| state.targets = split_ids(&targets));
}

#[given("a batch over {count:u32} numbered targets")]
fn batch_over_numbered_targets(batch_context: &BatchContext, count: u32) {
    batch_context.with_state(|state| {
        state.targets = (1..=count).map(|n| format!("target-{n}")).collect();
    });
}

#[given("the operation fails for target \"{target}\"")]
fn operation_fails_for(batch_context: &BatchContext, target: String) {
    batch_context.with_state(|state| {
        state.failing.insert(target);
    });
}

#[given("the batch is cancelled once {count:u32} operations finish")]
fn cancel_after(batch_context: &BatchContext, count: u32) {
    batch_context.with_state(|state| state.cancel_after = Some(as_count(count)));
}

#[when("the batch runs with concurrency {limit:u32}")]
fn run_batch(batch_context: &BatchContext, limit: u32) {
    let runtime = Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap_or_else(|err| panic!("build runtime: {err}"));
    let targets = batch_context.with_state(|state| state.targets.clone());
    let job = BatchJob::new(targets, batch_context.operation()).with_concurrency(as_count(limit));
    let executor = BatchExecutor::new(batch_context.cancel.clone());

    let result = runtime.block_on(executor.run(job));
    batch_context.with_state(|state| state.result = Some(result));
}

#[then("{succeeded:u32} targets succeed and {failed:u32} fails")]
fn counts_match(batch_context: &BatchContext, succeeded: u32, failed: u32) -> Result<(), StepError> {
    let result = result_of(batch_context)?;
    if result.succeeded_count == as_count(succeeded) && result.failed_count == as_count(failed) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {succeeded} succeeded and {failed} failed, got {} and {}",
            result.succeeded_count, result.failed_count
        )))
    }
}

#[then("target \"{target}\" is reported as failed")]
fn target_failed(batch_context: &BatchContext, target: String) -> Result<(), StepError> {
    let result = result_of(batch_context)?;
    match result.outcomes.get(&target) {
        Some(BatchOutcome::Failed(_)) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected {target} to fail, got {other:?}"
        ))),
    }
}

#[then("targets were attempted in the order \"{order}\"")]
fn attempted_in_order(batch_context: &BatchContext, order: String) -> Result<(), StepError> {
    let attempted = batch_context.tally.attempted();
    let expected = split_ids(&order);
    if attempted == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected order {expected:?}, got {attempted:?}"
        )))
    }
}

#[then("no more than {limit:u32} operations ran at once")]
fn peak_within_limit(batch_context: &BatchContext, limit: u32) -> Result<(), StepError> {
    let peak = batch_context.tally.peak();
    if (1..=as_count(limit)).contains(&peak) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected at most {limit} concurrent operations, saw {peak}"
        )))
    }
}

#[then("{count:u32} targets are reported as cancelled")]
fn cancelled_count(batch_context: &BatchContext, count: u32) -> Result<(), StepError> {
    let result = result_of(batch_context)?;
    let cancelled = result
        .iter()
        .filter(|(_, outcome)| matches!(outcome, BatchOutcome::Cancelled))
        .count();
    if result.cancelled_count == as_count(count) && cancelled == as_count(count) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} cancelled targets, got {}",
            result.cancelled_count
        )))
    }
}
