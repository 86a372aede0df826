//! Command-level orchestration over the dispatch core.
//!
//! [`ResourceOrchestrator`] is what the binary's handlers call. A single
//! operation runs adapter, then dispatcher under the retry executor. Waits
//! hand a kind-specific fetch to the [`Poller`], and multi-resource commands
//! drive one full pipeline per id through the [`BatchExecutor`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::batch::{BatchExecutor, BatchJob, BatchResult};
use crate::cancel::CancelSignal;
use crate::capacity::{self, CloudFilter, GpuQuery};
use crate::error::ApiError;
use crate::params::{BackendParameters, ParameterAdapter};
use crate::poll::{PollSpec, Poller};
use crate::resource::{Action, Dispatched, OperationKind, OperationRequest, Resource, ResourceKind};
use crate::retry::RetryExecutor;
use crate::ssh::SshEndpoint;
use crate::transport::{Dispatcher, QueryChannel, SdkApi};

/// Status of pods selected by [`ResourceOrchestrator::stop_all`].
pub const RUNNING: &str = "RUNNING";

/// How a multi-resource command spreads its work.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BatchOptions {
    /// Run targets concurrently.
    pub parallel: bool,
    /// Worker count when `parallel` is set.
    pub workers: usize,
}

impl BatchOptions {
    /// Sequential execution in list order.
    #[must_use]
    pub const fn sequential() -> Self {
        Self {
            parallel: false,
            workers: 1,
        }
    }

    /// Concurrency limit handed to the batch executor.
    #[must_use]
    pub const fn concurrency(self) -> usize {
        if self.parallel { self.workers } else { 1 }
    }
}

/// Returns the poll spec for waits on `kind`.
///
/// # Errors
///
/// Returns [`ApiError::Rejected`] for kinds that cannot be waited on and
/// [`ApiError::Validation`] for a zero interval.
pub fn wait_spec(
    kind: ResourceKind,
    interval: Duration,
    timeout: Duration,
) -> Result<PollSpec, ApiError> {
    let spec = match kind {
        ResourceKind::Pod => PollSpec::pod_running(interval, timeout),
        ResourceKind::Endpoint => PollSpec::endpoint_healthy(interval, timeout),
        ResourceKind::Volume
        | ResourceKind::Template
        | ResourceKind::Gpu
        | ResourceKind::Datacenter
        | ResourceKind::Cpu => {
            return Err(ApiError::Rejected {
                status: None,
                detail: format!("{kind} has no state to wait for"),
            });
        }
    };
    spec.map_err(|err| ApiError::validation("interval", err.to_string()))
}

struct Inner<S, Q> {
    adapter: ParameterAdapter,
    dispatcher: Dispatcher<S, Q>,
    retry: RetryExecutor,
    poller: Poller,
    batch: BatchExecutor,
}

/// Composes the adapter, dispatcher, retry, poll, and batch layers.
pub struct ResourceOrchestrator<S, Q> {
    inner: Arc<Inner<S, Q>>,
}

impl<S, Q> Clone for ResourceOrchestrator<S, Q> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, Q> std::fmt::Debug for ResourceOrchestrator<S, Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceOrchestrator")
            .field("adapter", &self.inner.adapter)
            .field("retry", &self.inner.retry)
            .finish_non_exhaustive()
    }
}

impl<S, Q> ResourceOrchestrator<S, Q>
where
    S: SdkApi + 'static,
    Q: QueryChannel + 'static,
{
    /// Builds an orchestrator. Polls and batches share the retry executor's
    /// cancellation signal.
    #[must_use]
    pub fn new(dispatcher: Dispatcher<S, Q>, adapter: ParameterAdapter, retry: RetryExecutor) -> Self {
        let cancel = retry.cancel_signal().clone();
        Self {
            inner: Arc::new(Inner {
                adapter,
                dispatcher,
                poller: Poller::new(retry.clone()),
                retry,
                batch: BatchExecutor::new(cancel),
            }),
        }
    }

    /// Cancellation signal observed by every layer.
    #[must_use]
    pub fn cancel_signal(&self) -> &CancelSignal {
        self.inner.retry.cancel_signal()
    }

    /// The underlying dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher<S, Q> {
        &self.inner.dispatcher
    }

    /// Shapes `request` without dispatching it.
    ///
    /// # Errors
    ///
    /// Returns the adapter's validation error.
    pub fn prepare(&self, request: &OperationRequest) -> Result<BackendParameters, ApiError> {
        self.inner.adapter.adapt_request(request)
    }

    /// Adapts and dispatches `request`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the adapter error without dispatching, or the dispatcher's
    /// final error once retries are exhausted.
    pub async fn execute(&self, request: &OperationRequest) -> Result<Dispatched, ApiError> {
        let params = self.prepare(request)?;
        self.inner
            .retry
            .execute(|| self.inner.dispatcher.dispatch(request, &params))
            .await
    }

    /// Lists every resource of `kind`.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, ApiError> {
        let request = OperationRequest::new(kind, OperationKind::List);
        self.execute(&request).await?.into_resources().ok_or_else(|| {
            ApiError::Malformed(format!("{kind} list did not return a list"))
        })
    }

    /// Lists GPU types narrowed and ordered by `query`.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn gpu_types(&self, query: &GpuQuery) -> Result<Vec<Resource>, ApiError> {
        Ok(query.apply(self.list(ResourceKind::Gpu).await?))
    }

    /// Lists datacenters, keeping those that offer `gpu` when one is given.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn regions(&self, gpu: Option<&str>) -> Result<Vec<Resource>, ApiError> {
        Ok(capacity::offering(self.list(ResourceKind::Datacenter).await?, gpu))
    }

    /// Lists the GPU types named in `wanted`, priced for `cloud`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for fewer than two names, before any
    /// call is made, or the listing error.
    pub async fn compare_gpus(
        &self,
        wanted: &[String],
        cloud: CloudFilter,
    ) -> Result<Vec<Resource>, ApiError> {
        capacity::check_comparison(wanted)?;
        let query = GpuQuery {
            cloud,
            ..GpuQuery::default()
        };
        let matched = capacity::select(self.gpu_types(&query).await?, wanted);
        if matched.len() < wanted.len() {
            warn!(
                requested = wanted.len(),
                matched = matched.len(),
                "some GPU types were not found"
            );
        }
        Ok(matched)
    }

    /// Fetches a pod and resolves where to reach it over SSH.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, or [`ApiError::Rejected`] when the pod is not
    /// running.
    pub async fn ssh_endpoint(&self, pod_id: &str) -> Result<SshEndpoint, ApiError> {
        let request = OperationRequest::new(ResourceKind::Pod, OperationKind::Get).with_target(pod_id);
        let pod = self
            .execute(&request)
            .await?
            .into_resource()
            .ok_or_else(|| ApiError::Malformed(String::from("pod get returned no resource")))?;
        SshEndpoint::for_pod(&pod)
    }

    /// One fetch for a wait, without retry. Endpoints are read through the
    /// health check so worker readiness is visible.
    async fn observe(&self, kind: ResourceKind, id: String) -> Result<Resource, ApiError> {
        let operation = match kind {
            ResourceKind::Endpoint => OperationKind::Action(Action::Health),
            _ => OperationKind::Get,
        };
        let request = OperationRequest::new(kind, operation).with_target(id);
        let params = self.prepare(&request)?;
        self.inner
            .dispatcher
            .dispatch(&request, &params)
            .await?
            .into_resource()
            .ok_or_else(|| ApiError::Malformed(format!("{kind} {operation} returned no resource")))
    }

    /// Waits until the resource satisfies `spec`.
    ///
    /// # Errors
    ///
    /// Returns the poller's timeout, terminal-state, cancellation, or fetch
    /// error.
    pub async fn wait(
        &self,
        kind: ResourceKind,
        id: &str,
        spec: &PollSpec,
    ) -> Result<Resource, ApiError> {
        info!(%kind, id, timeout = ?spec.timeout(), "waiting for resource");
        self.inner
            .poller
            .wait_for(id, |target| self.observe(kind, target), spec)
            .await
    }

    /// Creates a resource and waits for it to become ready.
    ///
    /// # Errors
    ///
    /// Returns the create error, or the wait error for the new id.
    pub async fn create_and_wait(
        &self,
        request: &OperationRequest,
        spec: &PollSpec,
    ) -> Result<Resource, ApiError> {
        let created = self
            .execute(request)
            .await?
            .into_resource()
            .ok_or_else(|| ApiError::Malformed(String::from("create returned no resource")))?;
        debug!(kind = %created.kind, id = %created.id, "created; waiting for readiness");
        self.wait(request.target_kind, &created.id, spec).await
    }

    /// Runs `operation` on every id in `targets`, each through the full
    /// adapter, dispatcher, and retry pipeline.
    pub async fn run_batch(
        &self,
        kind: ResourceKind,
        operation: OperationKind,
        targets: Vec<String>,
        options: BatchOptions,
    ) -> BatchResult<Dispatched> {
        let orchestrator = self.clone();
        let job = BatchJob::new(targets, move |id: String| {
            let worker = orchestrator.clone();
            async move {
                let request = OperationRequest::new(kind, operation).with_target(id);
                worker.execute(&request).await
            }
        })
        .with_concurrency(options.concurrency());
        self.inner.batch.run(job).await
    }

    /// Stops every running pod.
    ///
    /// # Errors
    ///
    /// Returns the list error; per-pod failures are outcomes.
    pub async fn stop_all(&self, options: BatchOptions) -> Result<BatchResult<Dispatched>, ApiError> {
        let targets: Vec<String> = self
            .list(ResourceKind::Pod)
            .await?
            .into_iter()
            .filter(|pod| pod.status.eq_ignore_ascii_case(RUNNING))
            .map(|pod| pod.id)
            .collect();
        info!(count = targets.len(), "stopping running pods");
        Ok(self
            .run_batch(
                ResourceKind::Pod,
                OperationKind::Action(Action::Stop),
                targets,
                options,
            )
            .await)
    }

    /// Deletes every resource of `kind`.
    ///
    /// # Errors
    ///
    /// Returns the list error; per-resource failures are outcomes.
    pub async fn delete_all(
        &self,
        kind: ResourceKind,
        options: BatchOptions,
    ) -> Result<BatchResult<Dispatched>, ApiError> {
        let targets: Vec<String> = self.list(kind).await?.into_iter().map(|item| item.id).collect();
        info!(%kind, count = targets.len(), "deleting resources");
        Ok(self
            .run_batch(kind, OperationKind::Delete, targets, options)
            .await)
    }
}

#[cfg(test)]
mod tests;
