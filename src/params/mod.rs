//! Shapes normalized CLI parameters into the payload each channel expects.
//!
//! Adaptation runs entirely before dispatch. It resolves aliases and the
//! `spot` shorthand, coerces values to their declared shape, substitutes
//! defaults on create, checks required fields, and finally renames keys for
//! the channel selected by the routing table. A parameter the selected
//! channel cannot carry is rejected when the caller supplied it and dropped
//! when it only came from a default.

mod fields;

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::resource::{OperationKind, OperationRequest, Parameters, ResourceKind};
use crate::transport::{Channel, route_for};

use fields::{Fallback, FieldSpec, Shape, accepts_spot, fields_for};

/// Cloud type used for pods when neither the caller nor the profile picks one.
pub const DEFAULT_CLOUD_TYPE: &str = "ALL";

/// Parameters ready for a specific channel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BackendParameters {
    /// Channel the parameters were shaped for.
    pub channel: Channel,
    /// Payload keyed by channel-specific names.
    pub fields: Map<String, Value>,
}

/// Applies defaults, translation, and gating to request parameters.
#[derive(Clone, Debug)]
pub struct ParameterAdapter {
    default_cloud_type: String,
}

impl Default for ParameterAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_CLOUD_TYPE)
    }
}

impl ParameterAdapter {
    /// Creates an adapter that fills pod cloud type with `default_cloud_type`.
    #[must_use]
    pub fn new(default_cloud_type: impl Into<String>) -> Self {
        Self {
            default_cloud_type: default_cloud_type.into(),
        }
    }

    /// Shapes the parameters of `request` for its routed channel.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for unknown, malformed, missing,
    /// immutable, or channel-incompatible parameters, and
    /// [`ApiError::Rejected`] when the operation has no route.
    pub fn adapt_request(&self, request: &OperationRequest) -> Result<BackendParameters, ApiError> {
        self.adapt(request.target_kind, request.operation, &request.parameters)
    }

    /// Shapes `parameters` for `operation` on `kind`.
    ///
    /// # Errors
    ///
    /// See [`Self::adapt_request`].
    pub fn adapt(
        &self,
        kind: ResourceKind,
        operation: OperationKind,
        parameters: &Parameters,
    ) -> Result<BackendParameters, ApiError> {
        let channel = route_for(kind, operation).ok_or_else(|| ApiError::Rejected {
            status: None,
            detail: format!("{kind} does not support '{operation}'"),
        })?;
        let specs = fields_for(kind, operation);

        let mut supplied = resolve_names(kind, operation, specs, parameters)?;
        apply_spot(kind, operation, &mut supplied)?;

        let mut normalized = Map::new();
        for spec in specs {
            if let Some(raw) = supplied.remove(spec.name) {
                if operation == OperationKind::Update && !spec.updatable {
                    return Err(ApiError::validation(
                        spec.name,
                        "cannot be changed after creation",
                    ));
                }
                normalized.insert(spec.name.to_owned(), coerce(spec, raw)?);
            }
        }
        let explicit: BTreeSet<String> = normalized.keys().cloned().collect();

        if operation == OperationKind::Update {
            if normalized.is_empty() {
                return Err(ApiError::validation("parameters", "nothing to update"));
            }
        } else {
            self.fill_defaults(specs, &mut normalized);
            check_required(kind, operation, specs, &normalized)?;
        }

        let fields = gate(specs, channel, normalized, &explicit)?;
        Ok(BackendParameters { channel, fields })
    }

    fn fill_defaults(&self, specs: &[FieldSpec], normalized: &mut Map<String, Value>) {
        for spec in specs {
            if normalized.contains_key(spec.name) {
                continue;
            }
            let value = match spec.fallback {
                Fallback::Unset => continue,
                Fallback::Text(text) => Value::from(text),
                Fallback::Integer(number) => Value::from(number),
                Fallback::Flag(flag) => Value::from(flag),
                Fallback::GeneratedName(prefix) => Value::from(generated_name(prefix)),
                Fallback::CloudType => Value::from(self.default_cloud_type.clone()),
            };
            normalized.insert(spec.name.to_owned(), value);
        }
    }
}

fn generated_name(prefix: &str) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{prefix}-{suffix}")
}

/// Maps aliases onto canonical names and rejects anything unrecognised.
fn resolve_names(
    kind: ResourceKind,
    operation: OperationKind,
    specs: &[FieldSpec],
    parameters: &Parameters,
) -> Result<Map<String, Value>, ApiError> {
    let mut resolved = Map::new();
    for (key, value) in parameters {
        let canonical = if key == "spot" && accepts_spot(kind, operation) {
            "spot"
        } else {
            specs
                .iter()
                .find(|spec| spec.name == key || spec.alias == Some(key.as_str()))
                .map(|spec| spec.name)
                .ok_or_else(|| {
                    ApiError::validation(key, format!("not accepted by {kind} {operation}"))
                })?
        };
        if resolved.insert(canonical.to_owned(), value.clone()).is_some() {
            return Err(ApiError::validation(
                key,
                format!("conflicts with another value for '{canonical}'"),
            ));
        }
    }
    Ok(resolved)
}

/// Translates `spot=true` into a zero bid per GPU.
fn apply_spot(
    kind: ResourceKind,
    operation: OperationKind,
    supplied: &mut Map<String, Value>,
) -> Result<(), ApiError> {
    let Some(raw) = supplied.remove("spot") else {
        return Ok(());
    };
    if !accepts_spot(kind, operation) {
        return Err(ApiError::validation("spot", "not accepted here"));
    }
    let spot = as_flag(&raw).ok_or_else(|| ApiError::validation("spot", "expected true or false"))?;
    if spot {
        if supplied.contains_key("bid_per_gpu") {
            return Err(ApiError::validation(
                "spot",
                "cannot be combined with bid_per_gpu",
            ));
        }
        supplied.insert(String::from("bid_per_gpu"), Value::from(0.0_f64));
    }
    Ok(())
}

fn check_required(
    kind: ResourceKind,
    operation: OperationKind,
    specs: &[FieldSpec],
    normalized: &Map<String, Value>,
) -> Result<(), ApiError> {
    if let Some(missing) = specs
        .iter()
        .find(|spec| spec.required && !normalized.contains_key(spec.name))
    {
        return Err(ApiError::validation(missing.name, "is required"));
    }
    let is_pod_create = kind == ResourceKind::Pod && operation == OperationKind::Create;
    if is_pod_create && !normalized.contains_key("image_name") && !normalized.contains_key("template_id") {
        return Err(ApiError::validation(
            "image_name",
            "is required unless template_id is set",
        ));
    }
    Ok(())
}

/// Renames keys for `channel`, enforcing that typed calls only carry fields
/// the SDK understands.
fn gate(
    specs: &[FieldSpec],
    channel: Channel,
    normalized: Map<String, Value>,
    explicit: &BTreeSet<String>,
) -> Result<Map<String, Value>, ApiError> {
    let mut shaped = Map::new();
    for (name, value) in normalized {
        let Some(spec) = specs.iter().find(|spec| spec.name == name) else {
            continue;
        };
        match channel {
            Channel::Generic => {
                shaped.insert(spec.generic_key.to_owned(), generic_value(spec, value));
            }
            Channel::Typed => match spec.sdk_key {
                Some(key) => {
                    shaped.insert(key.to_owned(), value);
                }
                None if explicit.contains(&name) => {
                    return Err(ApiError::validation(
                        name,
                        "only supported by the query channel, not the typed SDK call this operation uses",
                    ));
                }
                None => {}
            },
        }
    }
    Ok(shaped)
}

/// The query channel takes environment variables as key/value records.
fn generic_value(spec: &FieldSpec, value: Value) -> Value {
    match (spec.shape, value) {
        (Shape::EnvMap, Value::Object(map)) => Value::Array(
            map.into_iter()
                .map(|(key, value)| {
                    let mut entry = Map::new();
                    entry.insert(String::from("key"), Value::from(key));
                    entry.insert(String::from("value"), value);
                    Value::Object(entry)
                })
                .collect(),
        ),
        (_, other) => other,
    }
}

fn coerce(spec: &FieldSpec, raw: Value) -> Result<Value, ApiError> {
    let invalid = |expected: &str| ApiError::validation(spec.name, format!("expected {expected}"));
    match spec.shape {
        Shape::Text => match raw {
            Value::String(text) if !text.trim().is_empty() => Ok(Value::String(text.trim().to_owned())),
            Value::Number(number) => Ok(Value::String(number.to_string())),
            _ => Err(invalid("non-empty text")),
        },
        Shape::CommaText => split_list(&raw)
            .map(|items| Value::String(items.join(",")))
            .ok_or_else(|| invalid("text or a list of text")),
        Shape::List => split_list(&raw)
            .map(|items| Value::Array(items.into_iter().map(Value::String).collect()))
            .ok_or_else(|| invalid("a comma-separated list")),
        Shape::Integer => as_integer(&raw)
            .map(Value::from)
            .ok_or_else(|| invalid("a whole number")),
        Shape::Number => as_number(&raw)
            .map(Value::Number)
            .ok_or_else(|| invalid("a number")),
        Shape::Flag => as_flag(&raw)
            .map(Value::Bool)
            .ok_or_else(|| invalid("true or false")),
        Shape::EnvMap => env_map(spec.name, raw),
        Shape::Object => match raw {
            Value::Object(map) => Ok(Value::Object(map)),
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => Ok(Value::Object(map)),
                _ => Err(invalid("a JSON object")),
            },
            _ => Err(invalid("a JSON object")),
        },
    }
}

fn split_list(raw: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = match raw {
        Value::String(text) => text
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_owned)
            .collect(),
        Value::Array(values) => values
            .iter()
            .map(|value| value.as_str().map(|item| item.trim().to_owned()))
            .collect::<Option<Vec<_>>>()?
            .into_iter()
            .filter(|item| !item.is_empty())
            .collect(),
        _ => return None,
    };
    if items.is_empty() { None } else { Some(items) }
}

fn as_integer(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn as_number(raw: &Value) -> Option<Number> {
    match raw {
        Value::Number(number) => Some(number.clone()),
        Value::String(text) => text.trim().parse::<f64>().ok().and_then(Number::from_f64),
        _ => None,
    }
}

fn as_flag(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Accepts an object, a list of `KEY=VALUE` strings, or one comma-separated
/// string of pairs.
fn env_map(name: &str, raw: Value) -> Result<Value, ApiError> {
    let pairs: Vec<String> = match raw {
        Value::Object(map) => return Ok(Value::Object(map)),
        Value::String(text) => text.split(',').map(str::to_owned).collect(),
        Value::Array(values) => values
            .into_iter()
            .map(|value| match value {
                Value::String(text) => Ok(text),
                _ => Err(ApiError::validation(name, "expected KEY=VALUE text")),
            })
            .collect::<Result<_, _>>()?,
        _ => return Err(ApiError::validation(name, "expected KEY=VALUE pairs")),
    };

    let mut map = Map::new();
    for pair in pairs.iter().map(|pair| pair.trim()).filter(|pair| !pair.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ApiError::validation(name, format!("'{pair}' is not KEY=VALUE")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ApiError::validation(name, format!("'{pair}' has an empty key")));
        }
        map.insert(key.to_owned(), Value::from(value));
    }
    Ok(Value::Object(map))
}
