//! Shared fixtures for orchestration BDD scenarios.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rpctl::test_support::{ScriptedChannel, ScriptedSdk};
use rpctl::{
    ApiError, BatchResult, CancelSignal, Dispatched, Dispatcher, ParameterAdapter, Resource,
    ResourceOrchestrator, RetryExecutor, RetryPolicy,
};
use rstest::fixture;
use serde_json::{Value, json};
use tokio::runtime::{Builder, Runtime};

pub type TestOrchestrator = ResourceOrchestrator<ScriptedSdk, ScriptedChannel>;

/// What the `when` step produced.
#[derive(Clone, Debug)]
pub enum Outcome {
    Executed(Result<Dispatched, ApiError>),
    Resource(Result<Resource, ApiError>),
    Listed(Result<Vec<Resource>, ApiError>),
    Batch(Result<BatchResult<Dispatched>, ApiError>),
}

#[derive(Clone, Debug)]
pub struct OrchestrationContext {
    pub sdk: ScriptedSdk,
    pub channel: ScriptedChannel,
    pub orchestrator: TestOrchestrator,
    pub outcome: Arc<Mutex<Option<Outcome>>>,
}

impl OrchestrationContext {
    pub fn record(&self, outcome: Outcome) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[fixture]
pub fn orchestration_context() -> OrchestrationContext {
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
    OrchestrationContext {
        sdk,
        channel,
        orchestrator,
        outcome: Arc::new(Mutex::new(None)),
    }
}

/// Runtime with paused time so poll intervals and retry delays elapse
/// instantly.
pub fn paused_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap_or_else(|err| panic!("build runtime: {err}"))
}

/// Pod body in the shape the management API returns.
pub fn pod_body(id: &str, status: &str, ports: Value) -> Value {
    json!({"id": id, "desiredStatus": "RUNNING", "runtime": {"status": status, "ports": ports}})
}
