//! Generic query/mutation channel.

use reqwest::{Client, header::RETRY_AFTER};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::Credential;
use crate::error::ApiError;

use super::{ApiFuture, QueryChannel};

/// [`QueryChannel`] that posts documents to a GraphQL endpoint.
#[derive(Clone, Debug)]
pub struct GraphqlChannel {
    client: Client,
    url: String,
    credential: Credential,
}

#[derive(Serialize)]
struct Envelope<'a> {
    query: &'a str,
    variables: Value,
}

impl GraphqlChannel {
    /// Creates a channel for `url`.
    #[must_use]
    pub fn new(client: Client, url: impl Into<String>, credential: Credential) -> Self {
        Self {
            client,
            url: url.into(),
            credential,
        }
    }

    async fn post(&self, document: &'static str, variables: Value) -> Result<Value, ApiError> {
        debug!(url = %self.url, "query request");
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.credential.expose())
            .json(&Envelope {
                query: document,
                variables,
            })
            .send()
            .await?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(std::time::Duration::from_secs);
        let text = response.text().await?;
        if !status.is_success() {
            let detail = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|body| first_error(&body))
                .unwrap_or(text);
            return Err(ApiError::from_status(status.as_u16(), detail, retry_after));
        }
        unwrap_data(serde_json::from_str(&text)?)
    }
}

impl QueryChannel for GraphqlChannel {
    fn execute(&self, document: &'static str, variables: Value) -> ApiFuture<'_, Value> {
        Box::pin(self.post(document, variables))
    }
}

fn first_error(body: &Value) -> Option<String> {
    body.get("errors")?
        .as_array()?
        .iter()
        .find_map(|error| error.get("message").and_then(Value::as_str))
        .map(str::to_owned)
}

/// Returns the `data` member of a response, turning a non-empty `errors`
/// array into an [`ApiError`].
fn unwrap_data(body: Value) -> Result<Value, ApiError> {
    let has_errors = body
        .get("errors")
        .and_then(Value::as_array)
        .is_some_and(|errors| !errors.is_empty());
    if has_errors {
        let message = first_error(&body).unwrap_or_else(|| String::from("query failed"));
        return Err(ApiError::from_message(message));
    }
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(ApiError::Malformed(String::from("response carried no data"))),
        },
        _ => Err(ApiError::Malformed(String::from("response was not an object"))),
    }
}
