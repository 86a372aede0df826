//! Unit tests for command orchestration.

use std::time::Duration;

use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::error::ErrorKind;
use crate::retry::RetryPolicy;
use crate::test_support::{ScriptedChannel, ScriptedSdk};
use crate::transport::SdkCall;

type TestOrchestrator = ResourceOrchestrator<ScriptedSdk, ScriptedChannel>;

struct Harness {
    sdk: ScriptedSdk,
    channel: ScriptedChannel,
    orchestrator: TestOrchestrator,
}

#[fixture]
fn harness() -> Harness {
    let sdk = ScriptedSdk::new();
    let channel = ScriptedChannel::new();
    let policy = RetryPolicy::default()
        .with_delays(Duration::from_millis(100), Duration::from_millis(400))
        .with_jitter(0.0);
    let orchestrator = ResourceOrchestrator::new(
        Dispatcher::new(sdk.clone(), channel.clone()),
        ParameterAdapter::default(),
        RetryExecutor::new(policy, CancelSignal::new()),
    );
    Harness {
        sdk,
        channel,
        orchestrator,
    }
}

fn pod(id: &str, status: &str, ports: serde_json::Value) -> serde_json::Value {
    json!({"id": id, "desiredStatus": "RUNNING", "runtime": {"status": status, "ports": ports}})
}

#[rstest]
#[tokio::test]
async fn adapter_rejection_never_reaches_the_dispatcher(harness: Harness) {
    let request = OperationRequest::new(ResourceKind::Pod, OperationKind::Create)
        .with_param("image_name", "img")
        .with_param("country_code", "RO");

    let err = harness
        .orchestrator
        .execute(&request)
        .await
        .expect_err("generic-only field on the typed channel must fail");

    assert_eq!(err.kind(), ErrorKind::Permanent);
    assert_eq!(harness.sdk.call_count(), 0);
    assert!(harness.channel.invocations().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_through_the_pipeline(harness: Harness) {
    harness
        .sdk
        .push_err(ApiError::from_status(502, "bad gateway", None));
    harness.sdk.push_ok(json!([]));

    let pods = harness
        .orchestrator
        .list(ResourceKind::Pod)
        .await
        .expect("second attempt should succeed");

    assert!(pods.is_empty());
    assert_eq!(harness.sdk.call_count(), 2);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn create_then_wait_returns_the_running_pod(harness: Harness) {
    harness.sdk.push_ok(json!({"id": "p1", "desiredStatus": "RUNNING"}));
    harness.sdk.push_ok(pod("p1", "STARTING", json!([])));
    harness.sdk.push_ok(pod("p1", "RUNNING", json!([])));
    harness
        .sdk
        .push_ok(pod("p1", "RUNNING", json!([{"privatePort": 22, "publicPort": 40022}])));
    let request = OperationRequest::new(ResourceKind::Pod, OperationKind::Create)
        .with_param("image_name", "runpod/base");
    let spec = wait_spec(
        ResourceKind::Pod,
        Duration::from_secs(5),
        Duration::from_secs(300),
    )
    .expect("valid spec");

    let ready = harness
        .orchestrator
        .create_and_wait(&request, &spec)
        .await
        .expect("pod should become ready");

    assert_eq!(ready.id, "p1");
    assert_eq!(ready.status, "RUNNING");
    let calls = harness.sdk.calls();
    assert_eq!(calls.len(), 4);
    assert!(matches!(calls.first(), Some(SdkCall::CreatePod(_))));
    assert!(
        calls
            .iter()
            .skip(1)
            .all(|call| *call == SdkCall::GetPod(String::from("p1")))
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn wait_fails_fast_on_terminal_state(harness: Harness) {
    harness.sdk.push_ok(json!({"id": "p1", "desiredStatus": "EXITED", "runtime": null}));
    let spec = wait_spec(ResourceKind::Pod, Duration::from_secs(5), Duration::from_secs(60))
        .expect("valid spec");

    let err = harness
        .orchestrator
        .wait(ResourceKind::Pod, "p1", &spec)
        .await
        .expect_err("exited pod must fail");

    assert!(
        matches!(err, ApiError::TerminalState { ref state, .. } if state == "EXITED"),
        "got {err:?}"
    );
    assert_eq!(harness.sdk.call_count(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn endpoint_wait_polls_the_health_check(harness: Harness) {
    harness
        .sdk
        .push_ok(json!({"workers": {"ready": 0, "initializing": 1}}));
    harness.sdk.push_ok(json!({"workers": {"ready": 1}}));
    let spec = wait_spec(
        ResourceKind::Endpoint,
        Duration::from_secs(2),
        Duration::from_secs(60),
    )
    .expect("valid spec");

    let endpoint = harness
        .orchestrator
        .wait(ResourceKind::Endpoint, "ep1", &spec)
        .await
        .expect("endpoint should become healthy");

    assert_eq!(endpoint.status, "healthy");
    assert_eq!(
        harness.sdk.calls(),
        vec![
            SdkCall::EndpointHealth(String::from("ep1")),
            SdkCall::EndpointHealth(String::from("ep1")),
        ]
    );
}

#[test]
fn volumes_cannot_be_waited_on() {
    let err = wait_spec(ResourceKind::Volume, Duration::from_secs(1), Duration::from_secs(1))
        .expect_err("volumes have no readiness state");
    assert_eq!(err.kind(), ErrorKind::Permanent);
}

#[test]
fn zero_interval_is_a_validation_error() {
    let err = wait_spec(ResourceKind::Pod, Duration::ZERO, Duration::from_secs(1))
        .expect_err("zero interval must fail");
    assert!(matches!(err, ApiError::Validation { .. }), "got {err:?}");
}

#[rstest]
#[tokio::test]
async fn stop_all_only_targets_running_pods(harness: Harness) {
    harness.sdk.push_ok(json!([
        pod("p1", "RUNNING", json!([])),
        {"id": "p2", "desiredStatus": "EXITED", "runtime": null},
        pod("p3", "RUNNING", json!([])),
    ]));
    harness.sdk.set_fallback(Ok(json!({})));

    let result = harness
        .orchestrator
        .stop_all(BatchOptions::sequential())
        .await
        .expect("list should succeed");

    assert_eq!(result.outcomes.len(), 2);
    assert_eq!(result.succeeded_count, 2);
    assert!(result.is_success());
    assert_eq!(
        harness.sdk.calls(),
        vec![
            SdkCall::ListPods,
            SdkCall::StopPod(String::from("p1")),
            SdkCall::StopPod(String::from("p3")),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn delete_all_isolates_per_item_failures(harness: Harness) {
    harness.channel.push_ok(json!({"myself": {"networkVolumes": [
        {"id": "v1"}, {"id": "v2"}, {"id": "v3"}
    ]}}));
    harness.channel.push_ok(json!({"deleteNetworkVolume": true}));
    harness
        .channel
        .push_err(ApiError::from_message("volume is attached to a pod"));
    harness.channel.push_ok(json!({"deleteNetworkVolume": true}));

    let result = harness
        .orchestrator
        .delete_all(ResourceKind::Volume, BatchOptions::sequential())
        .await
        .expect("list should succeed");

    assert_eq!(result.succeeded_count, 2);
    assert_eq!(result.failed_count, 1);
    assert!(!result.is_success());
    assert!(matches!(
        result.outcomes.get("v2"),
        Some(crate::batch::BatchOutcome::Failed(_))
    ));
}

#[rstest]
#[tokio::test]
async fn parallel_batches_cover_every_target(harness: Harness) {
    harness.sdk.set_fallback(Ok(json!({})));
    let targets: Vec<String> = (1..=8).map(|n| format!("p{n}")).collect();
    let options = BatchOptions {
        parallel: true,
        workers: 3,
    };

    let result = harness
        .orchestrator
        .run_batch(
            ResourceKind::Pod,
            OperationKind::Delete,
            targets.clone(),
            options,
        )
        .await;

    assert_eq!(result.outcomes.len(), targets.len());
    assert_eq!(result.succeeded_count, targets.len());
    assert_eq!(harness.sdk.call_count(), targets.len());
}

#[rstest]
#[tokio::test]
async fn regions_keep_datacenters_offering_the_gpu(harness: Harness) {
    harness.channel.push_ok(json!({"myself": {"datacenters": [
        {"id": "US-TX-3", "gpuAvailability": [{"gpuTypeId": "NVIDIA A40", "gpuTypeDisplayName": "A40"}]},
        {"id": "EU-RO-1", "gpuAvailability": [{"gpuTypeId": "NVIDIA GeForce RTX 4090", "gpuTypeDisplayName": "RTX 4090"}]}
    ]}}));

    let regions = harness
        .orchestrator
        .regions(Some("4090"))
        .await
        .expect("listing should succeed");

    let ids: Vec<&str> = regions.iter().map(|dc| dc.id.as_str()).collect();
    assert_eq!(ids, ["EU-RO-1"]);
}

#[rstest]
#[tokio::test]
async fn comparing_one_gpu_sends_nothing(harness: Harness) {
    let err = harness
        .orchestrator
        .compare_gpus(&[String::from("A40")], CloudFilter::All)
        .await
        .expect_err("a single type must fail");

    assert!(matches!(err, ApiError::Validation { .. }), "got {err:?}");
    assert!(harness.channel.invocations().is_empty());
}

#[rstest]
#[tokio::test]
async fn comparison_respects_the_cloud_filter(harness: Harness) {
    harness.channel.push_ok(json!({"gpuTypes": [
        {"id": "NVIDIA A40", "displayName": "A40", "secureCloud": true, "communityCloud": false},
        {"id": "NVIDIA RTX A4000", "displayName": "RTX A4000", "secureCloud": false, "communityCloud": true},
        {"id": "NVIDIA L4", "displayName": "L4", "secureCloud": false, "communityCloud": true}
    ]}));
    let wanted = [String::from("A40"), String::from("RTX A4000"), String::from("L4")];

    let compared = harness
        .orchestrator
        .compare_gpus(&wanted, CloudFilter::Community)
        .await
        .expect("listing should succeed");

    let ids: Vec<&str> = compared.iter().map(|gpu| gpu.id.as_str()).collect();
    assert_eq!(ids, ["NVIDIA RTX A4000", "NVIDIA L4"]);
}

#[rstest]
#[tokio::test]
async fn ssh_endpoint_reads_the_public_port(harness: Harness) {
    harness.sdk.push_ok(pod(
        "p1",
        "RUNNING",
        json!([{"ip": "203.0.113.7", "privatePort": 22, "publicPort": 40022}]),
    ));

    let endpoint = harness
        .orchestrator
        .ssh_endpoint("p1")
        .await
        .expect("running pod resolves");

    assert_eq!(endpoint.host, "203.0.113.7");
    assert_eq!(endpoint.port, 40022);
    assert_eq!(harness.sdk.calls(), vec![SdkCall::GetPod(String::from("p1"))]);
}
