//! Error taxonomy shared by every layer of the orchestration core.
//!
//! Both transport channels fold their failures into [`ApiError`], and the
//! retry, poll, and batch layers pass errors through unchanged so callers can
//! branch on [`ErrorKind`] regardless of where a failure originated.

use std::time::Duration;

use thiserror::Error;

/// Coarse classification used for retry decisions and exit codes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// Rate limiting, server-side faults, and connection or timeout failures.
    Transient,
    /// Validation failures, rejected requests, and malformed payloads.
    Permanent,
    /// The referenced resource does not exist.
    NotFound,
    /// The credential was missing, invalid, or lacked permission.
    Unauthorized,
    /// A wait exceeded its deadline.
    Timeout,
    /// The caller cancelled the operation.
    Cancelled,
}

impl ErrorKind {
    /// Returns a short lowercase label suitable for logs and JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Errors produced by the transport, retry, poll, and batch layers.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApiError {
    /// A failure that may succeed when replayed.
    #[error("transient failure{}: {detail}", status_suffix(.status))]
    Transient {
        /// HTTP status reported by the backend, when one was received.
        status: Option<u16>,
        /// Backend or transport message.
        detail: String,
        /// Server-supplied delay before the next attempt.
        retry_after: Option<Duration>,
    },
    /// The backend rejected the request and replaying it will not help.
    #[error("request rejected{}: {detail}", status_suffix(.status))]
    Rejected {
        /// HTTP status reported by the backend, when one was received.
        status: Option<u16>,
        /// Backend message.
        detail: String,
    },
    /// Parameters were invalid before anything was sent.
    #[error("invalid parameter '{field}': {message}")]
    Validation {
        /// Parameter name as supplied by the caller.
        field: String,
        /// Reason the parameter was rejected.
        message: String,
    },
    /// The backend answered with a payload the client could not interpret.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// The referenced resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Authentication or authorisation failed.
    #[error("unauthorized: {0}; check RUNPOD_API_KEY or the api_key setting")]
    Unauthorized(String),
    /// A wait reached its deadline before the target condition held.
    #[error("timed out after {elapsed:?} waiting for {resource_id} (last status: {last_status})")]
    Timeout {
        /// Resource being waited on.
        resource_id: String,
        /// Time spent waiting.
        elapsed: Duration,
        /// Status observed on the final fetch.
        last_status: String,
    },
    /// The resource entered a state it cannot leave on its own.
    #[error("{resource_id} reached terminal state {state}")]
    TerminalState {
        /// Resource being waited on.
        resource_id: String,
        /// Terminal status reported by the backend.
        state: String,
    },
    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
    /// The operation itself crashed before producing a result.
    #[error("internal error: {0}")]
    Internal(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map_or_else(String::new, |code| format!(" (HTTP {code})"))
}

impl ApiError {
    /// Returns the coarse classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Rejected { .. }
            | Self::Validation { .. }
            | Self::Malformed(_)
            | Self::TerminalState { .. }
            | Self::Internal(_) => ErrorKind::Permanent,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Reports whether the default retry predicate would replay this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Builds a validation error for `field`.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Classifies a non-success HTTP status.
    ///
    /// 401 and 403 are credential problems, 404 is a missing resource, and
    /// 408, 429, and every 5xx are worth retrying. Anything else is a
    /// permanent rejection.
    #[must_use]
    pub fn from_status(
        status: u16,
        detail: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        let detail = detail.into();
        match status {
            401 | 403 => Self::Unauthorized(detail),
            404 => Self::NotFound(detail),
            408 | 429 | 500..=599 => Self::Transient {
                status: Some(status),
                detail,
                retry_after,
            },
            _ => Self::Rejected {
                status: Some(status),
                detail,
            },
        }
    }

    /// Classifies an error message returned inside a successful response body.
    ///
    /// The query channel reports failures as message strings, so the
    /// classification falls back to matching well-known phrases.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("not found") || lowered.contains("does not exist") {
            Self::NotFound(message)
        } else if lowered.contains("unauthorized") || lowered.contains("unauthenticated") {
            Self::Unauthorized(message)
        } else if lowered.contains("rate limit") || lowered.contains("too many requests") {
            Self::Transient {
                status: None,
                detail: message,
                retry_after: None,
            }
        } else {
            Self::Rejected {
                status: None,
                detail: message,
            }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() || value.is_connect() || value.is_request() || value.is_body() {
            return Self::Transient {
                status: value.status().map(|status| status.as_u16()),
                detail: value.to_string(),
                retry_after: None,
            };
        }
        if value.is_decode() {
            return Self::Malformed(value.to_string());
        }
        match value.status() {
            Some(status) => Self::from_status(status.as_u16(), value.to_string(), None),
            None => Self::Transient {
                status: None,
                detail: value.to_string(),
                retry_after: None,
            },
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        Self::Malformed(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    #[rstest]
    #[case(401, ErrorKind::Unauthorized)]
    #[case(403, ErrorKind::Unauthorized)]
    #[case(404, ErrorKind::NotFound)]
    #[case(408, ErrorKind::Transient)]
    #[case(429, ErrorKind::Transient)]
    #[case(500, ErrorKind::Transient)]
    #[case(503, ErrorKind::Transient)]
    #[case(400, ErrorKind::Permanent)]
    #[case(422, ErrorKind::Permanent)]
    fn status_codes_map_to_kinds(#[case] status: u16, #[case] expected: ErrorKind) {
        assert_eq!(ApiError::from_status(status, "boom", None).kind(), expected);
    }

    #[rstest]
    #[case("Pod not found", ErrorKind::NotFound)]
    #[case("Unauthorized request", ErrorKind::Unauthorized)]
    #[case("rate limit exceeded", ErrorKind::Transient)]
    #[case("gpuTypeId is invalid", ErrorKind::Permanent)]
    fn body_messages_map_to_kinds(#[case] message: &str, #[case] expected: ErrorKind) {
        assert_eq!(ApiError::from_message(message).kind(), expected);
    }

    #[test]
    fn rate_limit_keeps_retry_after() {
        let err = ApiError::from_status(429, "slow down", Some(Duration::from_secs(7)));
        let ApiError::Transient { retry_after, .. } = err else {
            panic!("expected transient error, got {err:?}");
        };
        assert_eq!(retry_after, Some(Duration::from_secs(7)));
    }

    /// Serves one canned HTTP response and closes the connection.
    fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind local listener");
        let address = listener.local_addr().expect("listener address");
        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut request = Vec::new();
            let mut chunk = [0_u8; 512];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => return,
                    Ok(read) => request.extend_from_slice(&chunk[..read]),
                }
            }
            stream.write_all(response.as_bytes()).ok();
        });
        format!("http://{address}/")
    }

    #[rstest]
    #[case::truncated_body(
        "HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\nshort",
        ErrorKind::Transient
    )]
    #[case::undecodable_body(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 8\r\n\r\nnot json",
        ErrorKind::Permanent
    )]
    #[tokio::test]
    async fn reading_a_response_classifies_failures(
        #[case] response: &'static str,
        #[case] expected: ErrorKind,
    ) {
        let url = serve_once(response);
        let reply = reqwest::Client::new()
            .get(url)
            .send()
            .await
            .expect("headers should arrive");
        let err = reply
            .json::<serde_json::Value>()
            .await
            .expect_err("body read must fail");

        assert_eq!(ApiError::from(err).kind(), expected);
    }

    #[test]
    fn unauthorized_message_points_at_credential() {
        let rendered = ApiError::Unauthorized(String::from("bad key")).to_string();
        assert!(rendered.contains("RUNPOD_API_KEY"), "rendered: {rendered}");
    }
}
