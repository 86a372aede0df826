//! Typed SDK surface over the provider's REST and serverless APIs.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, header::RETRY_AFTER};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::Credential;
use crate::error::ApiError;

use super::{ApiFuture, SdkApi, SdkCall};

/// [`SdkApi`] implementation backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct RestSdk {
    client: Client,
    rest_url: String,
    serverless_url: String,
    credential: Credential,
}

/// Method, URL, and body for one call.
#[derive(Clone, Debug, PartialEq)]
struct Plan {
    method: Method,
    url: String,
    body: Option<Value>,
}

impl RestSdk {
    /// Creates a client for the given management and serverless base URLs.
    #[must_use]
    pub fn new(
        client: Client,
        rest_url: impl Into<String>,
        serverless_url: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            client,
            rest_url: trim_base(&rest_url.into()),
            serverless_url: trim_base(&serverless_url.into()),
            credential,
        }
    }

    fn plan(&self, call: SdkCall) -> Plan {
        let rest = |method: Method, path: String, body: Option<Value>| Plan {
            method,
            url: format!("{}/{path}", self.rest_url),
            body,
        };
        let serverless = |method: Method, id: &str, verb: &str, body: Option<Value>| Plan {
            method,
            url: format!("{}/{id}/{verb}", self.serverless_url),
            body,
        };
        match call {
            SdkCall::CreatePod(fields) => rest(Method::POST, String::from("pods"), Some(camel_case(fields))),
            SdkCall::GetPod(id) => rest(Method::GET, format!("pods/{id}"), None),
            SdkCall::ListPods => rest(Method::GET, String::from("pods"), None),
            SdkCall::UpdatePod { id, fields } => {
                rest(Method::PATCH, format!("pods/{id}"), Some(camel_case(fields)))
            }
            SdkCall::TerminatePod(id) => rest(Method::DELETE, format!("pods/{id}"), None),
            SdkCall::StopPod(id) => rest(Method::POST, format!("pods/{id}/stop"), None),
            SdkCall::ResumePod(id) => rest(Method::POST, format!("pods/{id}/start"), None),
            SdkCall::RestartPod(id) => rest(Method::POST, format!("pods/{id}/restart"), None),
            SdkCall::CreateEndpoint(fields) => rest(
                Method::POST,
                String::from("endpoints"),
                Some(camel_case(fields)),
            ),
            SdkCall::GetEndpoint(id) => rest(Method::GET, format!("endpoints/{id}"), None),
            SdkCall::ListEndpoints => rest(Method::GET, String::from("endpoints"), None),
            SdkCall::UpdateEndpoint { id, fields } => rest(
                Method::PATCH,
                format!("endpoints/{id}"),
                Some(camel_case(fields)),
            ),
            SdkCall::DeleteEndpoint(id) => rest(Method::DELETE, format!("endpoints/{id}"), None),
            SdkCall::EndpointHealth(id) => serverless(Method::GET, &id, "health", None),
            SdkCall::RunJob { endpoint_id, input } => {
                serverless(Method::POST, &endpoint_id, "run", Some(job_body(input)))
            }
            SdkCall::RunJobSync { endpoint_id, input } => {
                serverless(Method::POST, &endpoint_id, "runsync", Some(job_body(input)))
            }
            SdkCall::PurgeQueue(id) => serverless(Method::POST, &id, "purge-queue", None),
            SdkCall::CreateTemplate(fields) => rest(
                Method::POST,
                String::from("templates"),
                Some(camel_case(fields)),
            ),
        }
    }

    fn request(&self, plan: Plan) -> RequestBuilder {
        let builder = self
            .client
            .request(plan.method, plan.url)
            .bearer_auth(self.credential.expose());
        match plan.body {
            Some(body) => builder.json(&body),
            None => builder,
        }
    }

    async fn send(&self, call: SdkCall) -> Result<Value, ApiError> {
        let plan = self.plan(call);
        debug!(method = %plan.method, url = %plan.url, "sdk request");
        let response = self.request(plan).send().await?;
        read_response(response).await
    }
}

impl SdkApi for RestSdk {
    fn call(&self, call: SdkCall) -> ApiFuture<'_, Value> {
        Box::pin(self.send(call))
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_owned()
}

fn job_body(input: Value) -> Value {
    let mut body = Map::new();
    body.insert(String::from("input"), input);
    Value::Object(body)
}

async fn read_response(response: Response) -> Result<Value, ApiError> {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after);
    let text = response.text().await?;

    if !status.is_success() {
        return Err(ApiError::from_status(
            status.as_u16(),
            error_detail(&text, status.canonical_reason()),
            retry_after,
        ));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// Parses a `Retry-After` header given in whole seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Pulls the most useful message out of an error body.
fn error_detail(text: &str, reason: Option<&str>) -> String {
    let parsed = serde_json::from_str::<Value>(text).ok();
    let message = parsed.as_ref().and_then(|body| {
        ["error", "message", "detail"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
    });
    match (message, text.trim()) {
        (Some(found), _) => found.to_owned(),
        (None, "") => reason.unwrap_or("no response body").to_owned(),
        (None, raw) => raw.to_owned(),
    }
}

/// Renames top-level snake_case keys to the camelCase the REST API expects.
fn camel_case(fields: Map<String, Value>) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (to_camel(&key), value))
            .collect(),
    )
}

fn to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}
