//! Core library for the `rpctl` GPU cloud operator CLI.
//!
//! The crate exposes a resource-operation core: a dispatcher that routes each
//! operation to a typed SDK surface or a generic query channel, a retry
//! executor with exponential backoff and jitter, a poller for asynchronous
//! state transitions, a bounded-concurrency batch executor, and the parameter
//! adapter that shapes caller input for whichever channel serves it.
//! Capacity filtering and SSH endpoint resolution sit on top of that core.

pub mod batch;
pub mod cancel;
pub mod capacity;
pub mod config;
pub mod error;
pub mod ops;
pub mod params;
pub mod poll;
pub mod resource;
pub mod retry;
pub mod ssh;
pub mod test_support;
pub mod transport;

pub use batch::{BatchExecutor, BatchJob, BatchOutcome, BatchResult};
pub use cancel::CancelSignal;
pub use capacity::{CloudFilter, GpuQuery, GpuSort};
pub use config::{ClientContext, ConfigError, Credential, RpctlConfig};
pub use error::{ApiError, ErrorKind};
pub use ops::{BatchOptions, ResourceOrchestrator, wait_spec};
pub use params::{BackendParameters, ParameterAdapter};
pub use poll::{PollSpec, PollState, Poller};
pub use resource::{
    Action, Dispatched, OperationKind, OperationRequest, Parameters, Receipt, Resource,
    ResourceKind,
};
pub use retry::{RetryExecutor, RetryObserver, RetryPolicy};
pub use ssh::{SshEndpoint, SshOptions};
pub use transport::{
    Channel, Dispatcher, GraphqlChannel, QueryChannel, RestSdk, SdkApi, SdkCall, route_for,
};

/// Orchestrator wired to the live REST and GraphQL channels.
pub type LiveOrchestrator = ResourceOrchestrator<RestSdk, GraphqlChannel>;

/// Builds a [`LiveOrchestrator`] from a resolved context.
///
/// # Errors
///
/// Returns [`ConfigError::Client`] when the HTTP client cannot be built.
pub fn connect(context: &ClientContext, cancel: CancelSignal) -> Result<LiveOrchestrator, ConfigError> {
    let client = context.http_client()?;
    let endpoints = context.endpoints();
    let sdk = RestSdk::new(
        client.clone(),
        endpoints.rest.clone(),
        endpoints.serverless.clone(),
        context.credential().clone(),
    );
    let query = GraphqlChannel::new(client, endpoints.graphql.clone(), context.credential().clone());
    Ok(ResourceOrchestrator::new(
        Dispatcher::new(sdk, query),
        ParameterAdapter::new(context.default_cloud_type()),
        RetryExecutor::new(context.retry_policy(), cancel),
    ))
}
