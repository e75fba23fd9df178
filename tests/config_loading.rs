use std::time::Duration;

use ferry_core::config::{AppConfig, FailurePolicy};
use ferry_core::error::FerryError;
use ferry_test_utils::{test_config, write_config};
use ferry_workflow::RunOptions;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[workflow]
failure_policy = "abort_run"
event_buffer = 32
max_concurrency = 4
cancel_grace_ms = 500

[model]
provider = "azure"
model_id = "gpt-4o-mini"
api_key = "sk-test-key"
base_url = "https://example.openai.azure.com/openai/deployments/gpt-4o-mini/chat/completions"
max_tokens = 2048
temperature = 0.3

[model.retry]
max_retries = 5
initial_backoff_ms = 200

[transcription]
model_id = "whisper-large"
api_key = "sk-audio-key"

[log]
filter = "ferry=debug"
"#;

    let (_dir, path) = write_config(toml_content);
    let config = AppConfig::load(&path).expect("load config");

    assert_eq!(config.workflow.failure_policy, FailurePolicy::AbortRun);
    assert_eq!(config.workflow.event_buffer, 32);
    assert_eq!(config.model.provider, "azure");
    assert_eq!(config.model.model_id, "gpt-4o-mini");
    assert_eq!(config.model.api_key, Some("sk-test-key".to_string()));
    assert_eq!(config.model.max_tokens, 2048);

    let retry = config.model.retry.expect("retry present");
    assert_eq!(retry.max_retries, 5);
    assert_eq!(retry.initial_backoff_ms, 200);
    assert_eq!(retry.max_backoff_ms, 30000);

    assert_eq!(config.transcription.model_id, "whisper-large");
    assert_eq!(config.log.filter, "ferry=debug");

    let options = RunOptions::from(&config.workflow);
    assert_eq!(options.max_concurrency, 4);
    assert_eq!(options.cancel_grace, Duration::from_millis(500));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("FERRY_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
model_id = "test-model"
api_key = "${FERRY_TEST_API_KEY}"

[transcription]
api_key = "${FERRY_TEST_UNSET_VARIABLE}"
"#;

    let (_dir, path) = write_config(toml_content);
    let config = AppConfig::load(&path).expect("load config");
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));
    assert_eq!(
        config.transcription.api_key,
        Some("${FERRY_TEST_UNSET_VARIABLE}".to_string())
    );

    std::env::remove_var("FERRY_TEST_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[model]
model_id = "gpt-4o-mini"
"#;

    let (_dir, path) = write_config(toml_content);
    let config = AppConfig::load(&path).expect("load config");

    assert_eq!(config.workflow.failure_policy, FailurePolicy::Isolate);
    assert_eq!(config.workflow.event_buffer, 256);
    assert_eq!(config.workflow.max_concurrency, 0);
    assert_eq!(config.workflow.cancel_grace_ms, 2000);
    assert_eq!(config.model.provider, "openai");
    assert!(config.model.retry.is_none());
    assert_eq!(config.transcription.model_id, "whisper-1");
    assert_eq!(config.log.filter, "ferry=info,warn");
}

#[test]
fn test_missing_file_and_bad_toml() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, FerryError::ConfigNotFound(_)));

    let err = AppConfig::parse("[workflow]\nfailure_policy = \"sometimes\"\n[model]\nmodel_id = \"m\"\n")
        .unwrap_err();
    assert!(matches!(err, FerryError::Config(_)));

    // [model] is required
    assert!(AppConfig::parse("[workflow]\nevent_buffer = 8\n").is_err());
}

#[test]
fn test_fixture_config_round_trips_through_file() {
    let fixture = test_config();
    let rendered = toml::to_string_pretty(&fixture).expect("serialize config");
    let (_dir, path) = write_config(&rendered);

    let loaded = AppConfig::load(&path).expect("load config");
    assert_eq!(loaded.model.model_id, "test-model");
    assert_eq!(loaded.model.api_key.as_deref(), Some("sk-test"));
    assert_eq!(loaded.workflow.failure_policy, fixture.workflow.failure_policy);
    assert_eq!(loaded.log.filter, fixture.log.filter);
}
