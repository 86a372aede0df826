//! BDD step definitions for resource orchestration.

use std::time::Duration;

use rpctl::{
    ApiError, BatchOptions, OperationKind, OperationRequest, ResourceKind, SdkCall, wait_spec,
};
use rstest_bdd_macros::{given, then, when};
use serde_json::json;

use super::test_helpers::{OrchestrationContext, Outcome, paused_runtime, pod_body};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn as_count(value: u32) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[given("a pod that exposes its ports after {checks:u32} status checks")]
fn pod_becomes_reachable(orchestration_context: &OrchestrationContext, checks: u32) {
    let sdk = &orchestration_context.sdk;
    sdk.push_ok(json!({"id": "p1", "desiredStatus": "RUNNING"}));
    for _ in 0..checks {
        sdk.push_ok(pod_body("p1", "RUNNING", json!([])));
    }
    sdk.push_ok(pod_body(
        "p1",
        "RUNNING",
        json!([{"privatePort": 22, "publicPort": 40022, "type": "tcp"}]),
    ));
}

#[given("an orchestrator with no scripted responses")]
fn empty_orchestrator(orchestration_context: &OrchestrationContext) {
    let _ = orchestration_context;
}

#[given("the pod listing is rate limited once")]
fn listing_rate_limited(orchestration_context: &OrchestrationContext) {
    let sdk = &orchestration_context.sdk;
    sdk.push_err(ApiError::from_status(
        429,
        "too many requests",
        Some(Duration::from_millis(50)),
    ));
    sdk.push_ok(json!([pod_body("p1", "RUNNING", json!([]))]));
}

#[given("the account has running pods \"{running}\" and an exited pod \"{exited}\"")]
fn account_with_pods(orchestration_context: &OrchestrationContext, running: String, exited: String) {
    let mut pods: Vec<_> = running
        .split(',')
        .map(|id| pod_body(id.trim(), "RUNNING", json!([])))
        .collect();
    pods.push(json!({"id": exited, "desiredStatus": "EXITED", "runtime": null}));
    let sdk = &orchestration_context.sdk;
    sdk.push_ok(serde_json::Value::Array(pods));
    sdk.set_fallback(Ok(json!({})));
}

#[when("I create the pod and wait for it")]
fn create_and_wait(orchestration_context: &OrchestrationContext) {
    let request = OperationRequest::new(ResourceKind::Pod, OperationKind::Create)
        .with_param("image_name", "runpod/base:0.4");
    let outcome = paused_runtime().block_on(async {
        let spec = wait_spec(
            ResourceKind::Pod,
            Duration::from_secs(5),
            Duration::from_secs(300),
        )?;
        orchestration_context
            .orchestrator
            .create_and_wait(&request, &spec)
            .await
    });
    orchestration_context.record(Outcome::Resource(outcome));
}

#[when("I create a pod with parameter \"{key}\" set to \"{value}\"")]
fn create_with_param(orchestration_context: &OrchestrationContext, key: String, value: String) {
    let request = OperationRequest::new(ResourceKind::Pod, OperationKind::Create)
        .with_param("image_name", "runpod/base:0.4")
        .with_param(key, value);
    let outcome = paused_runtime().block_on(orchestration_context.orchestrator.execute(&request));
    orchestration_context.record(Outcome::Executed(outcome));
}

#[when("I list pods")]
fn list_pods(orchestration_context: &OrchestrationContext) {
    let outcome =
        paused_runtime().block_on(orchestration_context.orchestrator.list(ResourceKind::Pod));
    orchestration_context.record(Outcome::Listed(outcome));
}

#[when("I stop every running pod")]
fn stop_every_running_pod(orchestration_context: &OrchestrationContext) {
    let outcome = paused_runtime().block_on(
        orchestration_context
            .orchestrator
            .stop_all(BatchOptions::sequential()),
    );
    orchestration_context.record(Outcome::Batch(outcome));
}

#[then("the pod \"{id}\" is reported as \"{status}\"")]
fn pod_reported(
    orchestration_context: &OrchestrationContext,
    id: String,
    status: String,
) -> Result<(), StepError> {
    match orchestration_context.outcome() {
        Some(Outcome::Resource(Ok(resource))) if resource.id == id && resource.status == status => {
            Ok(())
        }
        other => Err(StepError::Assertion(format!(
            "expected pod {id} with status {status}, got {other:?}"
        ))),
    }
}

#[then("the typed channel received 1 create and {checks:u32} status checks")]
fn create_then_checks(
    orchestration_context: &OrchestrationContext,
    checks: u32,
) -> Result<(), StepError> {
    let calls = orchestration_context.sdk.calls();
    let Some((first, rest)) = calls.split_first() else {
        return Err(StepError::Assertion(String::from("no calls were made")));
    };
    if !matches!(first, SdkCall::CreatePod(_)) {
        return Err(StepError::Assertion(format!(
            "expected a create first, got {first:?}"
        )));
    }
    let all_checks = rest
        .iter()
        .all(|call| *call == SdkCall::GetPod(String::from("p1")));
    if all_checks && rest.len() == as_count(checks) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {checks} status checks, got {rest:?}"
        )))
    }
}

#[then("the request fails mentioning \"{field}\"")]
fn request_fails(orchestration_context: &OrchestrationContext, field: String) -> Result<(), StepError> {
    match orchestration_context.outcome() {
        Some(Outcome::Executed(Err(err @ ApiError::Validation { .. })))
            if err.to_string().contains(&field) =>
        {
            Ok(())
        }
        other => Err(StepError::Assertion(format!(
            "expected a validation error naming {field}, got {other:?}"
        ))),
    }
}

#[then("nothing was sent to either channel")]
fn nothing_sent(orchestration_context: &OrchestrationContext) -> Result<(), StepError> {
    let typed = orchestration_context.sdk.call_count();
    let generic = orchestration_context.channel.invocations().len();
    if typed == 0 && generic == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no calls, saw {typed} typed and {generic} generic"
        )))
    }
}

#[then("{count:u32} pod is listed")]
fn pods_listed(orchestration_context: &OrchestrationContext, count: u32) -> Result<(), StepError> {
    match orchestration_context.outcome() {
        Some(Outcome::Listed(Ok(pods))) if pods.len() == as_count(count) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected {count} listed pods, got {other:?}"
        ))),
    }
}

#[then("the typed channel received {count:u32} calls")]
fn typed_call_count(
    orchestration_context: &OrchestrationContext,
    count: u32,
) -> Result<(), StepError> {
    let calls = orchestration_context.sdk.call_count();
    if calls == as_count(count) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} typed calls, got {calls}"
        )))
    }
}

#[then("pods \"{ids}\" were stopped")]
fn pods_stopped(orchestration_context: &OrchestrationContext, ids: String) -> Result<(), StepError> {
    let expected: Vec<SdkCall> = ids
        .split(',')
        .map(|id| SdkCall::StopPod(id.trim().to_owned()))
        .collect();
    let stops: Vec<SdkCall> = orchestration_context
        .sdk
        .calls()
        .into_iter()
        .filter(|call| matches!(call, SdkCall::StopPod(_)))
        .collect();
    let batch_ok = matches!(
        orchestration_context.outcome(),
        Some(Outcome::Batch(Ok(ref result))) if result.is_success()
    );
    if stops == expected && batch_ok {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected stops {expected:?}, got {stops:?}"
        )))
    }
}
