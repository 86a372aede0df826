//! Dual-channel transport for provider operations.
//!
//! Every `(kind, operation)` pair is served by exactly one [`Channel`],
//! chosen from the static table in [`route`]. Typed operations become an
//! [`SdkCall`] for an [`SdkApi`] implementation; generic operations become a
//! query document for a [`QueryChannel`]. Either way the [`Dispatcher`]
//! returns a normalized [`Dispatched`] value or an [`ApiError`]. It never
//! retries, polls, or batches; callers compose those around it.

mod documents;
pub mod graphql;
pub mod normalize;
pub mod rest;
pub mod route;

use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ApiError;
use crate::params::BackendParameters;
use crate::resource::{Action, Dispatched, OperationKind, OperationRequest, Receipt, ResourceKind};

use documents::{Document, Extract, Variables, document_for};

pub use graphql::GraphqlChannel;
pub use rest::RestSdk;
pub use route::{Channel, route_for};

/// Future returned by transport calls.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// One call on the typed SDK surface. Field maps use snake_case keys.
#[derive(Clone, Debug, PartialEq)]
pub enum SdkCall {
    /// Create a pod.
    CreatePod(Map<String, Value>),
    /// Fetch a pod.
    GetPod(String),
    /// List pods.
    ListPods,
    /// Modify a pod.
    UpdatePod {
        /// Pod id.
        id: String,
        /// Changed fields.
        fields: Map<String, Value>,
    },
    /// Terminate a pod.
    TerminatePod(String),
    /// Stop a pod.
    StopPod(String),
    /// Resume a stopped pod.
    ResumePod(String),
    /// Restart a pod.
    RestartPod(String),
    /// Create an endpoint.
    CreateEndpoint(Map<String, Value>),
    /// Fetch an endpoint.
    GetEndpoint(String),
    /// List endpoints.
    ListEndpoints,
    /// Modify an endpoint.
    UpdateEndpoint {
        /// Endpoint id.
        id: String,
        /// Changed fields.
        fields: Map<String, Value>,
    },
    /// Delete an endpoint.
    DeleteEndpoint(String),
    /// Check endpoint worker and queue health.
    EndpointHealth(String),
    /// Queue a job on an endpoint.
    RunJob {
        /// Endpoint id.
        endpoint_id: String,
        /// Job input.
        input: Value,
    },
    /// Run a job and wait for its output.
    RunJobSync {
        /// Endpoint id.
        endpoint_id: String,
        /// Job input.
        input: Value,
    },
    /// Drop queued jobs.
    PurgeQueue(String),
    /// Create a template.
    CreateTemplate(Map<String, Value>),
}

/// Typed SDK surface.
pub trait SdkApi: Send + Sync {
    /// Performs `call` and returns the raw response body.
    fn call(&self, call: SdkCall) -> ApiFuture<'_, Value>;
}

/// Generic query/mutation channel.
pub trait QueryChannel: Send + Sync {
    /// Executes `document` and returns its `data` object.
    fn execute(&self, document: &'static str, variables: Value) -> ApiFuture<'_, Value>;
}

/// Routes operations to the channel the table selects.
#[derive(Clone, Debug)]
pub struct Dispatcher<S, Q> {
    sdk: S,
    query: Q,
}

impl<S: SdkApi, Q: QueryChannel> Dispatcher<S, Q> {
    /// Creates a dispatcher over both channels.
    #[must_use]
    pub const fn new(sdk: S, query: Q) -> Self {
        Self { sdk, query }
    }

    /// Typed SDK channel.
    #[must_use]
    pub const fn sdk(&self) -> &S {
        &self.sdk
    }

    /// Generic query channel.
    #[must_use]
    pub const fn query(&self) -> &Q {
        &self.query
    }

    /// Executes `request` with already adapted `params`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for a missing or malformed target id,
    /// [`ApiError::Rejected`] for unsupported operations, and any error the
    /// channel reports.
    pub async fn dispatch(
        &self,
        request: &OperationRequest,
        params: &BackendParameters,
    ) -> Result<Dispatched, ApiError> {
        let kind = request.target_kind;
        let operation = request.operation;
        let channel = route_for(kind, operation).ok_or_else(|| unsupported(kind, operation))?;
        if channel != params.channel {
            return Err(ApiError::validation(
                "parameters",
                format!("shaped for {:?} but {kind} {operation} uses {channel:?}", params.channel),
            ));
        }
        let target = target_id(request, channel)?;
        debug!(%kind, %operation, ?channel, target = target.as_deref(), "dispatching");

        match channel {
            Channel::Typed => {
                let call = sdk_call(kind, operation, target.clone(), params.fields.clone())?;
                let body = self.sdk.call(call).await?;
                typed_result(kind, operation, target, body)
            }
            Channel::Generic => {
                let document =
                    document_for(kind, operation).ok_or_else(|| unsupported(kind, operation))?;
                let variables = variables(document.variables, target.as_deref(), &params.fields);
                let data = self.query.execute(document.text, variables).await?;
                generic_result(kind, &document, target, data)
            }
        }
    }
}

fn unsupported(kind: ResourceKind, operation: OperationKind) -> ApiError {
    ApiError::Rejected {
        status: None,
        detail: format!("{kind} does not support '{operation}'"),
    }
}

/// Typed ids become URL path segments; generic ids travel as variables and
/// may contain spaces (GPU type names do).
fn target_id(request: &OperationRequest, channel: Channel) -> Result<Option<String>, ApiError> {
    if !request.operation.requires_target() {
        return Ok(None);
    }
    let id = request
        .target_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::validation("id", "a resource id is required"))?;
    let unsafe_in_path = channel == Channel::Typed
        && (id.contains(['/', '?', '#']) || id.chars().any(char::is_whitespace));
    if unsafe_in_path || id.chars().any(char::is_control) {
        return Err(ApiError::validation("id", format!("'{id}' is not a valid id")));
    }
    Ok(Some(id.to_owned()))
}

fn required(target: Option<String>) -> Result<String, ApiError> {
    target.ok_or_else(|| ApiError::validation("id", "a resource id is required"))
}

fn take_input(mut fields: Map<String, Value>) -> Value {
    fields.remove("input").unwrap_or(Value::Null)
}

fn sdk_call(
    kind: ResourceKind,
    operation: OperationKind,
    target: Option<String>,
    fields: Map<String, Value>,
) -> Result<SdkCall, ApiError> {
    use OperationKind::{Create, Delete, Get, List, Update};

    let call = match (kind, operation) {
        (ResourceKind::Pod, Create) => SdkCall::CreatePod(fields),
        (ResourceKind::Pod, Get) => SdkCall::GetPod(required(target)?),
        (ResourceKind::Pod, List) => SdkCall::ListPods,
        (ResourceKind::Pod, Update) => SdkCall::UpdatePod {
            id: required(target)?,
            fields,
        },
        (ResourceKind::Pod, Delete) => SdkCall::TerminatePod(required(target)?),
        (ResourceKind::Pod, OperationKind::Action(Action::Stop)) => {
            SdkCall::StopPod(required(target)?)
        }
        (ResourceKind::Pod, OperationKind::Action(Action::Start)) => {
            SdkCall::ResumePod(required(target)?)
        }
        (ResourceKind::Pod, OperationKind::Action(Action::Restart)) => {
            SdkCall::RestartPod(required(target)?)
        }
        (ResourceKind::Endpoint, Create) => SdkCall::CreateEndpoint(fields),
        (ResourceKind::Endpoint, Get) => SdkCall::GetEndpoint(required(target)?),
        (ResourceKind::Endpoint, List) => SdkCall::ListEndpoints,
        (ResourceKind::Endpoint, Update) => SdkCall::UpdateEndpoint {
            id: required(target)?,
            fields,
        },
        (ResourceKind::Endpoint, Delete) => SdkCall::DeleteEndpoint(required(target)?),
        (ResourceKind::Endpoint, OperationKind::Action(Action::Health)) => {
            SdkCall::EndpointHealth(required(target)?)
        }
        (ResourceKind::Endpoint, OperationKind::Action(Action::Run)) => SdkCall::RunJob {
            endpoint_id: required(target)?,
            input: take_input(fields),
        },
        (ResourceKind::Endpoint, OperationKind::Action(Action::RunSync)) => SdkCall::RunJobSync {
            endpoint_id: required(target)?,
            input: take_input(fields),
        },
        (ResourceKind::Endpoint, OperationKind::Action(Action::PurgeQueue)) => {
            SdkCall::PurgeQueue(required(target)?)
        }
        (ResourceKind::Template, Create) => SdkCall::CreateTemplate(fields),
        _ => return Err(unsupported(kind, operation)),
    };
    Ok(call)
}

fn typed_result(
    kind: ResourceKind,
    operation: OperationKind,
    target: Option<String>,
    body: Value,
) -> Result<Dispatched, ApiError> {
    match operation {
        OperationKind::Create | OperationKind::Get | OperationKind::Update => {
            if body.is_null() {
                return Err(match target {
                    Some(id) => ApiError::NotFound(format!("{kind} '{id}'")),
                    None => ApiError::Malformed(format!("empty {kind} {operation} response")),
                });
            }
            normalize::resource(kind, body).map(Dispatched::Resource)
        }
        OperationKind::List => normalize::resources(kind, body).map(Dispatched::Resources),
        OperationKind::Action(Action::Health) => {
            let id = required(target)?;
            normalize::health(&id, body).map(Dispatched::Resource)
        }
        OperationKind::Delete | OperationKind::Action(_) => Ok(Dispatched::Receipt(Receipt {
            target_id: target,
            payload: body,
        })),
    }
}

fn variables(style: Variables, target: Option<&str>, fields: &Map<String, Value>) -> Value {
    let mut variables = Map::new();
    match style {
        Variables::Empty => {}
        Variables::Id(key) => {
            if let Some(id) = target {
                variables.insert(key.to_owned(), Value::from(id));
            }
        }
        Variables::Input => {
            variables.insert(String::from("input"), Value::Object(fields.clone()));
        }
        Variables::InputWithId => {
            let mut input = fields.clone();
            if let Some(id) = target {
                input.insert(String::from("id"), Value::from(id));
            }
            variables.insert(String::from("input"), Value::Object(input));
        }
        Variables::Flat(key) => {
            variables.extend(fields.clone());
            if let Some(id) = target {
                variables.insert(key.to_owned(), Value::from(id));
            }
        }
    }
    Value::Object(variables)
}

fn select(data: Value, path: &[&str]) -> Result<Value, ApiError> {
    path.iter().try_fold(data, |value, segment| match value {
        Value::Object(mut map) => Ok(map.remove(*segment).unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        other => Err(ApiError::Malformed(format!(
            "expected an object at '{segment}', got {other}"
        ))),
    })
}

fn generic_result(
    kind: ResourceKind,
    document: &Document,
    target: Option<String>,
    data: Value,
) -> Result<Dispatched, ApiError> {
    let payload = select(data, document.path)?;
    let describe = || format!("{kind} '{}'", target.as_deref().unwrap_or_default());
    match document.extract {
        Extract::One => {
            if payload.is_null() {
                return Err(ApiError::NotFound(describe()));
            }
            normalize::resource(kind, payload).map(Dispatched::Resource)
        }
        Extract::First => match payload {
            Value::Array(items) => items
                .into_iter()
                .next()
                .ok_or_else(|| ApiError::NotFound(describe()))
                .and_then(|item| normalize::resource(kind, item))
                .map(Dispatched::Resource),
            Value::Null => Err(ApiError::NotFound(describe())),
            other => normalize::resource(kind, other).map(Dispatched::Resource),
        },
        Extract::Many => normalize::resources(kind, payload).map(Dispatched::Resources),
        Extract::FindById => {
            let wanted = target.clone().unwrap_or_default();
            normalize::resources(kind, payload)?
                .into_iter()
                .find(|resource| resource.id == wanted)
                .map(Dispatched::Resource)
                .ok_or_else(|| ApiError::NotFound(describe()))
        }
        Extract::Receipt => Ok(Dispatched::Receipt(Receipt {
            target_id: target.clone(),
            payload,
        })),
    }
}
