//! Converts backend payloads into [`Resource`] values.

use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::resource::{Resource, ResourceKind};

/// Status assigned to kinds whose payload carries no status of its own.
pub const AVAILABLE: &str = "AVAILABLE";

/// Status of a datacenter that is not open for new deployments.
pub const UNLISTED: &str = "UNLISTED";

/// Builds a resource from one backend object.
///
/// # Errors
///
/// Returns [`ApiError::Malformed`] when `value` is not an object or has no
/// usable `id`.
pub fn resource(kind: ResourceKind, value: Value) -> Result<Resource, ApiError> {
    let attributes = match value {
        Value::Object(attributes) => attributes,
        other => {
            return Err(ApiError::Malformed(format!(
                "expected a {kind} object, got {}",
                type_name(&other)
            )));
        }
    };
    let id = match attributes.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => {
            return Err(ApiError::Malformed(format!("{kind} payload has no id")));
        }
    };
    let status = status_of(kind, &attributes);
    Ok(Resource {
        id,
        kind,
        status,
        attributes,
    })
}

/// Builds resources from a list payload. `null` is treated as empty.
///
/// # Errors
///
/// Returns [`ApiError::Malformed`] when `value` is not a list or any element
/// fails [`resource`].
pub fn resources(kind: ResourceKind, value: Value) -> Result<Vec<Resource>, ApiError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.into_iter().map(|item| resource(kind, item)).collect(),
        other => Err(ApiError::Malformed(format!(
            "expected a list of {kind}, got {}",
            type_name(&other)
        ))),
    }
}

/// Builds an endpoint resource from a health check payload such as
/// `{"workers": {"ready": 1, ...}, "jobs": {...}}`.
///
/// # Errors
///
/// Returns [`ApiError::Malformed`] when the payload is not an object.
pub fn health(endpoint_id: &str, value: Value) -> Result<Resource, ApiError> {
    let attributes = match value {
        Value::Object(attributes) => attributes,
        other => {
            return Err(ApiError::Malformed(format!(
                "expected a health object, got {}",
                type_name(&other)
            )));
        }
    };
    let worker_count = |state: &str| {
        attributes
            .get("workers")
            .and_then(|workers| workers.get(state))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    let status = if worker_count("ready") >= 1 {
        "healthy"
    } else if worker_count("initializing") >= 1 || worker_count("running") >= 1 {
        "initializing"
    } else {
        "unhealthy"
    };
    Ok(Resource {
        id: endpoint_id.to_owned(),
        kind: ResourceKind::Endpoint,
        status: status.to_owned(),
        attributes,
    })
}

fn status_of(kind: ResourceKind, attributes: &Map<String, Value>) -> String {
    let text = |key: &str| {
        attributes
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    };
    let runtime_status = || {
        attributes
            .get("runtime")
            .and_then(|runtime| runtime.get("status"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    };
    match kind {
        ResourceKind::Pod => runtime_status()
            .or_else(|| text("desiredStatus"))
            .unwrap_or_else(|| String::from("UNKNOWN")),
        ResourceKind::Endpoint => text("status").unwrap_or_else(|| String::from("READY")),
        ResourceKind::Datacenter => match attributes.get("listed") {
            Some(Value::Bool(false)) => String::from(UNLISTED),
            _ => String::from(AVAILABLE),
        },
        ResourceKind::Volume | ResourceKind::Template | ResourceKind::Gpu | ResourceKind::Cpu => {
            text("status").unwrap_or_else(|| String::from(AVAILABLE))
        }
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
