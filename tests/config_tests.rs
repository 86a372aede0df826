//! Unit tests for configuration loading and validation.

use std::time::Duration;

use rpctl::config::{ConfigError, DEFAULT_GRAPHQL_URL, DEFAULT_REST_URL, DEFAULT_SERVERLESS_URL};
use rpctl::{Credential, RpctlConfig};
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn valid_config() -> RpctlConfig {
    RpctlConfig {
        api_key: Some(String::from("rpa_EXAMPLEKEY")),
        profile: String::from("default"),
        rest_url: String::from(DEFAULT_REST_URL),
        serverless_url: String::from(DEFAULT_SERVERLESS_URL),
        graphql_url: String::from(DEFAULT_GRAPHQL_URL),
        request_timeout_secs: 30,
        max_attempts: 3,
        retry_base_delay_ms: 1000,
        retry_max_delay_ms: 30_000,
        retry_jitter_percent: 50,
        poll_interval_secs: 5,
        poll_timeout_secs: 300,
        default_cloud_type: String::from("ALL"),
        batch_workers: 5,
    }
}

#[rstest]
fn config_validation_rejects_missing_api_key_with_actionable_error(valid_config: RpctlConfig) {
    let cfg = RpctlConfig {
        api_key: None,
        ..valid_config
    };

    let error = cfg.validate().expect_err("api key is required");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error:?}");
    };
    assert!(
        message.contains("RUNPOD_API_KEY"),
        "error should mention env var: {message}"
    );
    assert!(
        message.contains("rpctl.toml"),
        "error should mention config file: {message}"
    );
    assert!(
        message.contains("api_key"),
        "error should mention TOML key: {message}"
    );
}

#[rstest]
fn whitespace_api_key_counts_as_missing(valid_config: RpctlConfig) {
    let cfg = RpctlConfig {
        api_key: Some(String::from("   ")),
        ..valid_config
    };

    let error = cfg.into_context().expect_err("blank key must be rejected");
    assert!(matches!(error, ConfigError::MissingField(_)), "got {error:?}");
}

/// Verifies that every out-of-range setting names both the environment
/// variable and the TOML key that controls it.
#[rstest]
#[case::rest_url(|cfg: &mut RpctlConfig| cfg.rest_url = String::from("ftp://x"), "RUNPOD_REST_URL", "rest_url")]
#[case::graphql_url(|cfg: &mut RpctlConfig| cfg.graphql_url.clear(), "RUNPOD_GRAPHQL_URL", "graphql_url")]
#[case::timeout(|cfg: &mut RpctlConfig| cfg.request_timeout_secs = 0, "RUNPOD_REQUEST_TIMEOUT_SECS", "request_timeout_secs")]
#[case::attempts(|cfg: &mut RpctlConfig| cfg.max_attempts = 0, "RUNPOD_MAX_ATTEMPTS", "max_attempts")]
#[case::delays(|cfg: &mut RpctlConfig| cfg.retry_base_delay_ms = 60_000, "RUNPOD_RETRY_BASE_DELAY_MS", "retry_base_delay_ms")]
#[case::jitter(|cfg: &mut RpctlConfig| cfg.retry_jitter_percent = 101, "RUNPOD_RETRY_JITTER_PERCENT", "retry_jitter_percent")]
#[case::interval(|cfg: &mut RpctlConfig| cfg.poll_interval_secs = 0, "RUNPOD_POLL_INTERVAL_SECS", "poll_interval_secs")]
#[case::wait_timeout(|cfg: &mut RpctlConfig| cfg.poll_timeout_secs = u64::MAX, "RUNPOD_POLL_TIMEOUT_SECS", "poll_timeout_secs")]
#[case::zero_wait_timeout(|cfg: &mut RpctlConfig| cfg.poll_timeout_secs = 0, "RUNPOD_POLL_TIMEOUT_SECS", "poll_timeout_secs")]
#[case::cloud(|cfg: &mut RpctlConfig| cfg.default_cloud_type = String::from("PRIVATE"), "RUNPOD_DEFAULT_CLOUD_TYPE", "default_cloud_type")]
#[case::workers(|cfg: &mut RpctlConfig| cfg.batch_workers = 50, "RUNPOD_BATCH_WORKERS", "batch_workers")]
fn config_validation_produces_actionable_errors(
    valid_config: RpctlConfig,
    #[case] mutate: fn(&mut RpctlConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    mutate(&mut cfg);

    let message = cfg
        .validate()
        .expect_err("validation should fail")
        .to_string();
    assert!(
        message.contains(env_var),
        "error should mention env var {env_var}: {message}"
    );
    assert!(
        message.contains(toml_key),
        "error should mention TOML key {toml_key}: {message}"
    );
}

#[rstest]
fn settings_validate_without_a_credential(valid_config: RpctlConfig) {
    let cfg = RpctlConfig {
        api_key: None,
        ..valid_config
    };
    cfg.validate_settings()
        .unwrap_or_else(|err| panic!("settings alone should validate: {err}"));
}

#[rstest]
fn into_context_freezes_resolved_settings(valid_config: RpctlConfig) {
    let cfg = RpctlConfig {
        max_attempts: 4,
        retry_base_delay_ms: 250,
        retry_max_delay_ms: 2000,
        retry_jitter_percent: 0,
        default_cloud_type: String::from("SECURE"),
        ..valid_config
    };

    let context = cfg
        .into_context()
        .unwrap_or_else(|err| panic!("valid config yields context: {err}"));

    assert_eq!(context.credential().expose(), "rpa_EXAMPLEKEY");
    assert_eq!(context.profile(), "default");
    assert_eq!(context.endpoints().rest, DEFAULT_REST_URL);
    assert_eq!(context.endpoints().serverless, DEFAULT_SERVERLESS_URL);
    assert_eq!(context.endpoints().graphql, DEFAULT_GRAPHQL_URL);
    assert_eq!(context.request_timeout(), Duration::from_secs(30));
    assert_eq!(context.poll_interval(), Duration::from_secs(5));
    assert_eq!(context.poll_timeout(), Duration::from_secs(300));
    assert_eq!(context.default_cloud_type(), "SECURE");
    assert_eq!(context.batch_workers(), 5);

    let policy = context.retry_policy();
    assert_eq!(policy.max_attempts, 4);
    assert_eq!(policy.base_delay, Duration::from_millis(250));
    assert_eq!(policy.max_delay, Duration::from_millis(2000));
    assert_eq!(policy.backoff_delay(3), Duration::from_millis(1000));
}

#[test]
fn credential_debug_output_is_redacted() {
    let credential = Credential::new("rpa_SECRET");
    let rendered = format!("{credential:?}");
    assert!(!rendered.contains("rpa_SECRET"), "leaked: {rendered}");
    assert_eq!(credential.expose(), "rpa_SECRET");
}

#[tokio::test]
async fn config_loads_api_key_and_overrides_from_environment() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let home = tmp.path().to_string_lossy().to_string();
    let _guard = rpctl::test_support::EnvGuard::apply(&[
        ("HOME", Some(home.as_str())),
        ("XDG_CONFIG_HOME", Some(home.as_str())),
        ("RPCTL_CONFIG_PATH", None),
        ("RUNPOD_API_KEY", Some("rpa_FROMENV")),
        ("RUNPOD_DEFAULT_CLOUD_TYPE", Some("COMMUNITY")),
    ])
    .await;

    let cfg = RpctlConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("environment config should load: {err}"));

    assert_eq!(cfg.api_key.as_deref(), Some("rpa_FROMENV"));
    assert_eq!(cfg.default_cloud_type, "COMMUNITY");
    assert_eq!(cfg.rest_url, DEFAULT_REST_URL);
    assert_eq!(cfg.batch_workers, 5);
    cfg.validate()
        .unwrap_or_else(|err| panic!("loaded config should validate: {err}"));
}
