//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::ApiError;
use crate::transport::{ApiFuture, QueryChannel, SdkApi, SdkCall};

type Script = Arc<StdMutex<VecDeque<Result<Value, ApiError>>>>;

type Fallback = Arc<StdMutex<Option<Result<Value, ApiError>>>>;

fn next_response(script: &Script, fallback: &Fallback) -> Result<Value, ApiError> {
    let queued = script
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front();
    queued.unwrap_or_else(|| {
        fallback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| {
                Err(ApiError::Malformed(String::from(
                    "no scripted response available",
                )))
            })
    })
}

/// Scripted SDK that answers calls with pre-seeded responses in FIFO order.
///
/// Every call is recorded so tests can assert on what reached the typed
/// channel. Once the queue is empty the fallback response, if any, is
/// returned for every further call.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSdk {
    responses: Script,
    fallback: Fallback,
    calls: Arc<StdMutex<Vec<SdkCall>>>,
    delay: Option<Duration>,
}

impl ScriptedSdk {
    /// Creates an SDK with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every response by `delay`.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues a successful response body.
    pub fn push_ok(&self, body: Value) {
        self.push(Ok(body));
    }

    /// Queues a failure.
    pub fn push_err(&self, error: ApiError) {
        self.push(Err(error));
    }

    /// Queues an arbitrary outcome.
    pub fn push(&self, outcome: Result<Value, ApiError>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }

    /// Sets the response returned once the queue runs dry.
    pub fn set_fallback(&self, outcome: Result<Value, ApiError>) {
        *self.fallback.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }

    /// Returns a snapshot of every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<SdkCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl SdkApi for ScriptedSdk {
    fn call(&self, call: SdkCall) -> ApiFuture<'_, Value> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        let outcome = next_response(&self.responses, &self.fallback);
        let delay = self.delay;
        Box::pin(async move {
            if let Some(pause) = delay {
                tokio::time::sleep(pause).await;
            }
            outcome
        })
    }
}

/// Records a single document sent through [`ScriptedChannel`].
#[derive(Clone, Debug, PartialEq)]
pub struct QueryInvocation {
    /// Document text.
    pub document: &'static str,
    /// Variables sent with the document.
    pub variables: Value,
}

impl QueryInvocation {
    /// Returns the operation name declared by the document, if any.
    #[must_use]
    pub fn operation_name(&self) -> Option<&str> {
        self.document
            .split_whitespace()
            .skip_while(|word| *word != "query" && *word != "mutation")
            .nth(1)
            .map(|name| name.split(['(', '{']).next().unwrap_or(name))
    }
}

/// Scripted query channel that answers documents in FIFO order.
#[derive(Clone, Debug, Default)]
pub struct ScriptedChannel {
    responses: Script,
    fallback: Fallback,
    invocations: Arc<StdMutex<Vec<QueryInvocation>>>,
}

impl ScriptedChannel {
    /// Creates a channel with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful `data` object.
    pub fn push_ok(&self, data: Value) {
        self.push(Ok(data));
    }

    /// Queues a failure.
    pub fn push_err(&self, error: ApiError) {
        self.push(Err(error));
    }

    /// Queues an arbitrary outcome.
    pub fn push(&self, outcome: Result<Value, ApiError>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }

    /// Sets the response returned once the queue runs dry.
    pub fn set_fallback(&self, outcome: Result<Value, ApiError>) {
        *self.fallback.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }

    /// Returns a snapshot of every document received so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<QueryInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl QueryChannel for ScriptedChannel {
    fn execute(&self, document: &'static str, variables: Value) -> ApiFuture<'_, Value> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(QueryInvocation {
                document,
                variables,
            });
        let outcome = next_response(&self.responses, &self.fallback);
        Box::pin(async move { outcome })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let changes: Vec<(&str, Option<&str>)> =
            pairs.iter().map(|(key, value)| (*key, Some(*value))).collect();
        Self::apply(&changes).await
    }

    /// Sets or removes variables while holding a global mutex. `None`
    /// removes the variable for the lifetime of the guard.
    pub async fn apply(changes: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                changes.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(changes.len());
        for (key, value) in changes {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
