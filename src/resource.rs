//! Normalized resource model and the operation requests that act on it.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

/// Kinds of remote resource managed by the CLI.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A single GPU or CPU compute instance.
    Pod,
    /// An autoscaled serverless worker group.
    Endpoint,
    /// A persistent network-attached volume.
    Volume,
    /// A reusable container configuration.
    Template,
    /// A GPU type with its pricing and stock information.
    Gpu,
    /// A datacenter with per-GPU availability.
    Datacenter,
    /// A CPU type offered for CPU pods.
    Cpu,
}

impl ResourceKind {
    /// Returns the lowercase name used in commands and output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pod => "pod",
            Self::Endpoint => "endpoint",
            Self::Volume => "volume",
            Self::Template => "template",
            Self::Gpu => "gpu",
            Self::Datacenter => "datacenter",
            Self::Cpu => "cpu",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource-specific verbs beyond CRUD.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Stop a running pod.
    Stop,
    /// Resume a stopped pod.
    Start,
    /// Restart a pod in place.
    Restart,
    /// Check worker and queue health of an endpoint.
    Health,
    /// Submit an asynchronous job to an endpoint.
    Run,
    /// Submit a job and wait for its output.
    RunSync,
    /// Fetch the status of a submitted job.
    JobStatus,
    /// Cancel a submitted job.
    JobCancel,
    /// Drop every queued job on an endpoint.
    PurgeQueue,
    /// Fetch GPU availability for a specific count and cloud.
    Check,
}

impl Action {
    /// Returns the command-line spelling of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Start => "start",
            Self::Restart => "restart",
            Self::Health => "health",
            Self::Run => "run",
            Self::RunSync => "run-sync",
            Self::JobStatus => "job-status",
            Self::JobCancel => "job-cancel",
            Self::PurgeQueue => "purge-queue",
            Self::Check => "check",
        }
    }
}

/// Operation performed by a request.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Create a new resource.
    Create,
    /// Fetch one resource by id.
    Get,
    /// Fetch every resource of a kind.
    List,
    /// Modify an existing resource.
    Update,
    /// Remove a resource.
    Delete,
    /// Perform a resource-specific verb.
    Action(Action),
}

impl OperationKind {
    /// Reports whether this operation needs a target identifier.
    #[must_use]
    pub const fn requires_target(self) -> bool {
        !matches!(self, Self::Create | Self::List)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Get => f.write_str("get"),
            Self::List => f.write_str("list"),
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
            Self::Action(action) => f.write_str(action.as_str()),
        }
    }
}

/// Caller-supplied parameters keyed by their normalized snake_case name.
pub type Parameters = BTreeMap<String, Value>;

/// A single logical call against the provider.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationRequest {
    /// What to do.
    pub operation: OperationKind,
    /// Which kind of resource it applies to.
    pub target_kind: ResourceKind,
    /// Identifier of the target for operations that need one.
    pub target_id: Option<String>,
    /// Operation parameters.
    pub parameters: Parameters,
}

impl OperationRequest {
    /// Starts a request with no target and no parameters.
    #[must_use]
    pub const fn new(target_kind: ResourceKind, operation: OperationKind) -> Self {
        Self {
            operation,
            target_kind,
            target_id: None,
            parameters: BTreeMap::new(),
        }
    }

    /// Sets the target identifier.
    #[must_use]
    pub fn with_target(mut self, id: impl Into<String>) -> Self {
        self.target_id = Some(id.into());
        self
    }

    /// Adds or replaces a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Replaces every parameter.
    #[must_use]
    pub fn with_params(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A provider resource as seen by the CLI.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Resource {
    /// Provider identifier.
    pub id: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Backend-reported status, compared only for equality.
    pub status: String,
    /// Remaining fields exactly as the backend returned them.
    pub attributes: Map<String, Value>,
}

impl Resource {
    /// Looks up a nested attribute by dotted path, for example `runtime.ports`.
    #[must_use]
    pub fn attribute(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        segments.try_fold(self.attributes.get(first)?, |value, segment| {
            value.get(segment)
        })
    }
}

/// Successful result of a dispatched operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Dispatched {
    /// A single resource.
    Resource(Resource),
    /// Every resource returned by a list.
    Resources(Vec<Resource>),
    /// Acknowledgement for operations that do not return a resource.
    Receipt(Receipt),
}

impl Dispatched {
    /// Returns the single resource, if this is one.
    #[must_use]
    pub fn into_resource(self) -> Option<Resource> {
        match self {
            Self::Resource(resource) => Some(resource),
            Self::Resources(_) | Self::Receipt(_) => None,
        }
    }

    /// Returns the listed resources, if this is a list.
    #[must_use]
    pub fn into_resources(self) -> Option<Vec<Resource>> {
        match self {
            Self::Resources(resources) => Some(resources),
            Self::Resource(_) | Self::Receipt(_) => None,
        }
    }
}

/// Acknowledgement returned for deletes, lifecycle verbs, and job control.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Receipt {
    /// Identifier the operation acted on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Backend response body, or `null` when none was returned.
    pub payload: Value,
}
