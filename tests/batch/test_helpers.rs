//! Shared fixtures for batch BDD scenarios.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rpctl::{ApiError, BatchResult, CancelSignal};
use rstest::fixture;

/// Future returned by the scripted batch operation.
pub type OperationFuture = Pin<Box<dyn Future<Output = Result<String, ApiError>> + Send>>;

/// Simulated latency of one operation.
pub const OPERATION_LATENCY: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct TallyState {
    in_flight: usize,
    peak: usize,
    finished: usize,
    attempted: Vec<String>,
}

/// Records how the batch drove the operation.
#[derive(Clone, Debug, Default)]
pub struct Tally {
    state: Arc<Mutex<TallyState>>,
}

impl Tally {
    fn start(&self, id: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight += 1;
        state.peak = state.peak.max(state.in_flight);
        state.attempted.push(id.to_owned());
    }

    fn finish(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight -= 1;
        state.finished += 1;
        state.finished
    }

    pub fn peak(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .peak
    }

    pub fn attempted(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .attempted
            .clone()
    }
}

#[derive(Debug, Default)]
pub struct BatchState {
    pub targets: Vec<String>,
    pub failing: HashSet<String>,
    pub cancel_after: Option<usize>,
    pub result: Option<BatchResult<String>>,
}

#[derive(Clone, Debug, Default)]
pub struct BatchContext {
    pub state: Arc<Mutex<BatchState>>,
    pub tally: Tally,
    pub cancel: CancelSignal,
}

impl BatchContext {
    pub fn with_state<R>(&self, apply: impl FnOnce(&mut BatchState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state)
    }

    /// Builds the operation handed to the executor: it sleeps, fails for
    /// targets marked as failing, and fires the cancel signal once the
    /// configured number of operations have finished.
    pub fn operation(&self) -> impl Fn(String) -> OperationFuture + Send + Sync + 'static {
        let (failing, cancel_after) =
            self.with_state(|state| (state.failing.clone(), state.cancel_after));
        let tally = self.tally.clone();
        let cancel = self.cancel.clone();
        move |id: String| -> OperationFuture {
            let recorder = tally.clone();
            let signal = cancel.clone();
            let fails = failing.contains(&id);
            Box::pin(async move {
                recorder.start(&id);
                tokio::time::sleep(OPERATION_LATENCY).await;
                let finished = recorder.finish();
                if cancel_after.is_some_and(|limit| finished >= limit) {
                    signal.cancel();
                }
                if fails {
                    Err(ApiError::from_status(400, format!("{id} rejected"), None))
                } else {
                    Ok(id)
                }
            })
        }
    }
}

#[fixture]
pub fn batch_context() -> BatchContext {
    BatchContext::default()
}
