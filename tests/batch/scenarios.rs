//! BDD scenarios for batch execution.

use rstest_bdd_macros::scenario;

use super::test_helpers::{BatchContext, batch_context};

#[scenario(
    path = "tests/features/batch.feature",
    name = "Sequential batch isolates a failing target"
)]
fn scenario_sequential_failure(batch_context: BatchContext) {
    let _ = batch_context;
}

#[scenario(
    path = "tests/features/batch.feature",
    name = "Parallel batch respects the concurrency limit"
)]
fn scenario_parallel_limit(batch_context: BatchContext) {
    let _ = batch_context;
}

#[scenario(
    path = "tests/features/batch.feature",
    name = "Cancelling a batch marks unfinished targets as cancelled"
)]
fn scenario_cancellation(batch_context: BatchContext) {
    let _ = batch_context;
}
