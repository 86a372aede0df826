//! Configuration loading via `ortho-config`.
//!
//! [`RpctlConfig`] merges defaults, `rpctl.toml`, and `RUNPOD_*` environment
//! variables. [`RpctlConfig::into_context`] validates the result and freezes
//! it into a [`ClientContext`], which the binary builds once and threads
//! through every command.

use std::fmt;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::batch::MAX_WORKERS;
use crate::poll::MAX_WAIT_TIMEOUT;
use crate::retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};

/// Default management API base URL.
pub const DEFAULT_REST_URL: &str = "https://rest.runpod.io/v1";
/// Default serverless job API base URL.
pub const DEFAULT_SERVERLESS_URL: &str = "https://api.runpod.ai/v2";
/// Default query endpoint.
pub const DEFAULT_GRAPHQL_URL: &str = "https://api.runpod.io/graphql";

const CLOUD_TYPES: [&str; 3] = ["ALL", "SECURE", "COMMUNITY"];

/// Settings for the `rpctl` binary.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "RUNPOD",
    discovery(
        app_name = "rpctl",
        env_var = "RPCTL_CONFIG_PATH",
        config_file_name = "rpctl.toml",
        dotfile_name = ".rpctl.toml",
        project_file_name = "rpctl.toml"
    )
)]
pub struct RpctlConfig {
    /// API key sent as a bearer credential. Required for any call.
    pub api_key: Option<String>,
    /// Profile label, logged when a command starts.
    #[ortho_config(default = "default".to_owned())]
    pub profile: String,
    /// Management API base URL.
    #[ortho_config(default = DEFAULT_REST_URL.to_owned())]
    pub rest_url: String,
    /// Serverless job API base URL.
    #[ortho_config(default = DEFAULT_SERVERLESS_URL.to_owned())]
    pub serverless_url: String,
    /// Query/mutation endpoint.
    #[ortho_config(default = DEFAULT_GRAPHQL_URL.to_owned())]
    pub graphql_url: String,
    /// Per-request timeout in seconds.
    #[ortho_config(default = 30)]
    pub request_timeout_secs: u64,
    /// Attempts per call, including the first.
    #[ortho_config(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
    /// Delay after the first failed attempt, in milliseconds.
    #[ortho_config(default = 1000)]
    pub retry_base_delay_ms: u64,
    /// Ceiling for any retry delay, in milliseconds.
    #[ortho_config(default = 30_000)]
    pub retry_max_delay_ms: u64,
    /// Jitter applied to retry delays, as a percentage of the delay.
    #[ortho_config(default = 50)]
    pub retry_jitter_percent: u8,
    /// Seconds between status checks while waiting.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Seconds before a wait gives up.
    #[ortho_config(default = 300)]
    pub poll_timeout_secs: u64,
    /// Cloud type used for pods that do not choose one.
    #[ortho_config(default = "ALL".to_owned())]
    pub default_cloud_type: String,
    /// Workers used by parallel batch commands.
    #[ortho_config(default = 5)]
    pub batch_workers: usize,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to rpctl.toml",
            self.description, self.env_var, self.toml_key
        ))
    }

    fn invalid(&self, reason: &str) -> ConfigError {
        ConfigError::Invalid(format!(
            "{} {reason}: check {} or {} in rpctl.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const API_KEY: FieldMetadata = FieldMetadata::new("RunPod API key", "RUNPOD_API_KEY", "api_key");
const REST_URL: FieldMetadata = FieldMetadata::new("REST API URL", "RUNPOD_REST_URL", "rest_url");
const SERVERLESS_URL: FieldMetadata =
    FieldMetadata::new("serverless API URL", "RUNPOD_SERVERLESS_URL", "serverless_url");
const GRAPHQL_URL: FieldMetadata =
    FieldMetadata::new("GraphQL URL", "RUNPOD_GRAPHQL_URL", "graphql_url");
const MAX_ATTEMPTS: FieldMetadata =
    FieldMetadata::new("retry attempt count", "RUNPOD_MAX_ATTEMPTS", "max_attempts");
const RETRY_DELAYS: FieldMetadata = FieldMetadata::new(
    "retry base delay",
    "RUNPOD_RETRY_BASE_DELAY_MS",
    "retry_base_delay_ms",
);
const RETRY_JITTER: FieldMetadata = FieldMetadata::new(
    "retry jitter",
    "RUNPOD_RETRY_JITTER_PERCENT",
    "retry_jitter_percent",
);
const POLL_INTERVAL_FIELD: FieldMetadata = FieldMetadata::new(
    "poll interval",
    "RUNPOD_POLL_INTERVAL_SECS",
    "poll_interval_secs",
);
const POLL_TIMEOUT_FIELD: FieldMetadata = FieldMetadata::new(
    "wait timeout",
    "RUNPOD_POLL_TIMEOUT_SECS",
    "poll_timeout_secs",
);
const REQUEST_TIMEOUT: FieldMetadata = FieldMetadata::new(
    "request timeout",
    "RUNPOD_REQUEST_TIMEOUT_SECS",
    "request_timeout_secs",
);
const CLOUD_TYPE: FieldMetadata = FieldMetadata::new(
    "default cloud type",
    "RUNPOD_DEFAULT_CLOUD_TYPE",
    "default_cloud_type",
);
const BATCH_WORKERS: FieldMetadata =
    FieldMetadata::new("batch worker count", "RUNPOD_BATCH_WORKERS", "batch_workers");

impl RpctlConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("rpctl")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    fn require_url(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(metadata.missing());
        }
        if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
            return Err(metadata.invalid("must be an http(s) URL"));
        }
        Ok(())
    }

    /// Validates every setting except the credential.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for empty values and
    /// [`ConfigError::Invalid`] for out-of-range ones.
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        Self::require_url(&self.rest_url, &REST_URL)?;
        Self::require_url(&self.serverless_url, &SERVERLESS_URL)?;
        Self::require_url(&self.graphql_url, &GRAPHQL_URL)?;
        if self.request_timeout_secs == 0 {
            return Err(REQUEST_TIMEOUT.invalid("must be at least one second"));
        }
        if self.max_attempts == 0 {
            return Err(MAX_ATTEMPTS.invalid("must be at least 1"));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(RETRY_DELAYS.invalid("must not exceed retry_max_delay_ms"));
        }
        if self.retry_jitter_percent > 100 {
            return Err(RETRY_JITTER.invalid("must be between 0 and 100"));
        }
        if self.poll_interval_secs == 0 {
            return Err(POLL_INTERVAL_FIELD.invalid("must be at least one second"));
        }
        if self.poll_timeout_secs == 0 || self.poll_timeout_secs > MAX_WAIT_TIMEOUT.as_secs() {
            return Err(POLL_TIMEOUT_FIELD.invalid(&format!(
                "must be between 1 and {} seconds",
                MAX_WAIT_TIMEOUT.as_secs()
            )));
        }
        if !CLOUD_TYPES.contains(&self.default_cloud_type.as_str()) {
            return Err(CLOUD_TYPE.invalid("must be one of ALL, SECURE, or COMMUNITY"));
        }
        if self.batch_workers == 0 || self.batch_workers > MAX_WORKERS {
            return Err(BATCH_WORKERS.invalid("must be between 1 and 20"));
        }
        Ok(())
    }

    /// Performs semantic validation, including the credential.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the API key is absent and
    /// any error from [`Self::validate_settings`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.credential()?;
        self.validate_settings()
    }

    fn credential(&self) -> Result<Credential, ConfigError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(Credential::new)
            .ok_or_else(|| API_KEY.missing())
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_delays(
                Duration::from_millis(self.retry_base_delay_ms),
                Duration::from_millis(self.retry_max_delay_ms),
            )
            .with_jitter(jitter_fraction(self.retry_jitter_percent))
    }

    /// Validates the configuration and freezes it into a [`ClientContext`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn into_context(self) -> Result<ClientContext, ConfigError> {
        let credential = self.credential()?;
        self.validate_settings()?;
        let retry_policy = self.retry_policy();
        Ok(ClientContext {
            credential,
            profile: self.profile,
            endpoints: Endpoints {
                rest: self.rest_url,
                serverless: self.serverless_url,
                graphql: self.graphql_url,
            },
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            retry_policy,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            poll_timeout: Duration::from_secs(self.poll_timeout_secs),
            default_cloud_type: self.default_cloud_type,
            batch_workers: self.batch_workers,
        })
    }
}

#[expect(
    clippy::float_arithmetic,
    reason = "percentage to fraction conversion for the jitter setting"
)]
fn jitter_fraction(percent: u8) -> f64 {
    f64::from(percent) / 100.0
}

/// API key wrapper that never prints its value.
#[derive(Clone, Eq, PartialEq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the raw key for use in an `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Base URLs for both channels.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoints {
    /// Management API base URL.
    pub rest: String,
    /// Serverless job API base URL.
    pub serverless: String,
    /// Query/mutation endpoint.
    pub graphql: String,
}

/// Resolved, immutable settings for one invocation.
#[derive(Clone, Debug)]
pub struct ClientContext {
    credential: Credential,
    profile: String,
    endpoints: Endpoints,
    request_timeout: Duration,
    retry_policy: RetryPolicy,
    poll_interval: Duration,
    poll_timeout: Duration,
    default_cloud_type: String,
    batch_workers: usize,
}

impl ClientContext {
    /// Bearer credential.
    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Profile label.
    #[must_use]
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Channel base URLs.
    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Retry policy for every dispatched call.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Default poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Default wait timeout.
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Cloud type used when a pod does not choose one.
    #[must_use]
    pub fn default_cloud_type(&self) -> &str {
        &self.default_cloud_type
    }

    /// Default worker count for parallel batches.
    #[must_use]
    pub const fn batch_workers(&self) -> usize {
        self.batch_workers
    }

    /// Builds the HTTP client shared by both channels.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Client`] when the TLS backend cannot be
    /// initialised.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!("rpctl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ConfigError::Client(err.to_string()))
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// A value is present but out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// The HTTP client could not be built.
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
