//! BDD scenarios for resource orchestration.

use rstest_bdd_macros::scenario;

use super::test_helpers::{OrchestrationContext, orchestration_context};

#[scenario(
    path = "tests/features/orchestration.feature",
    name = "Create a pod and wait until it is reachable"
)]
fn scenario_create_and_wait(orchestration_context: OrchestrationContext) {
    let _ = orchestration_context;
}

#[scenario(
    path = "tests/features/orchestration.feature",
    name = "Reject a parameter the pod channel cannot carry"
)]
fn scenario_adapter_rejection(orchestration_context: OrchestrationContext) {
    let _ = orchestration_context;
}

#[scenario(
    path = "tests/features/orchestration.feature",
    name = "Retry a rate-limited listing"
)]
fn scenario_rate_limited_listing(orchestration_context: OrchestrationContext) {
    let _ = orchestration_context;
}

#[scenario(
    path = "tests/features/orchestration.feature",
    name = "Stop only the running pods"
)]
fn scenario_stop_running(orchestration_context: OrchestrationContext) {
    let _ = orchestration_context;
}
