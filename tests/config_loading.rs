use std::io::Write;

use agentdag_core::config::AppConfig;
use agentdag_core::error::DagError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
max_parallel = 4
node_timeout_secs = 30
fail_fast = true
event_capacity = 64

[http]
timeout_secs = 10
user_agent = "agentdag-test"

[llm]
base_url = "http://localhost:11434/v1/chat/completions"
api_key = "sk-test-key"
model = "llama3.2"

[llm.retry]
max_retries = 5
initial_backoff_ms = 100
max_backoff_ms = 1000

[log]
filter = "agentdag=debug"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_parallel, 4);
    assert_eq!(config.engine.node_timeout_secs, 30);
    assert!(config.engine.fail_fast);
    assert_eq!(config.engine.event_capacity, 64);
    assert_eq!(config.http.timeout_secs, 10);
    assert_eq!(config.http.user_agent, "agentdag-test");
    assert_eq!(config.llm.base_url, "http://localhost:11434/v1/chat/completions");
    assert_eq!(config.llm.model, "llama3.2");
    assert_eq!(config.llm.resolve_api_key().unwrap(), "sk-test-key");
    assert_eq!(config.llm.retry.max_retries, 5);
    assert_eq!(config.llm.retry.initial_backoff_ms, 100);
    assert_eq!(config.log.filter, "agentdag=debug");
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("AGENTDAG_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[llm]
api_key = "${AGENTDAG_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.llm.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("AGENTDAG_TEST_API_KEY");
}

#[test]
fn test_unexpanded_key_falls_back_to_env_lookup() {
    let toml_content = r#"
[llm]
api_key = "${AGENTDAG_TEST_NEVER_SET}"
api_key_env = "AGENTDAG_TEST_NEVER_SET_EITHER"
"#;

    let config = AppConfig::from_toml_str(toml_content).expect("parse config");
    let err = config.llm.resolve_api_key().unwrap_err();
    assert!(matches!(err, DagError::MissingCredential(ref v) if v == "AGENTDAG_TEST_NEVER_SET_EITHER"));
}

#[test]
fn test_empty_config_uses_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"").expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_parallel, 0);
    assert_eq!(config.engine.node_timeout_secs, 0);
    assert!(!config.engine.fail_fast);
    assert_eq!(config.http.timeout_secs, 30);
    assert_eq!(config.llm.model, "gpt-4o-mini");
    assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
    assert_eq!(config.llm.retry.max_retries, 2);
    assert_eq!(config.log.filter, "agentdag=info,warn");
}

#[test]
fn test_explicit_missing_file_is_error() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("absent.toml");

    let err = AppConfig::load(&path).unwrap_err();
    assert!(matches!(err, DagError::ConfigNotFound(_)));

    let config = AppConfig::load_or_default(&path).expect("defaults");
    assert_eq!(config.engine.max_parallel, 0);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let err = AppConfig::from_toml_str("[engine\nmax_parallel = ").unwrap_err();
    assert!(matches!(err, DagError::Config(_)));
}

#[test]
fn test_config_round_trips_through_toml() {
    let mut config = AppConfig::default();
    config.engine.max_parallel = 3;
    config.llm.model = "gpt-4o".into();

    let text = config.to_toml_string().expect("serialize");
    let reloaded = AppConfig::from_toml_str(&text).expect("reparse");
    assert_eq!(reloaded.engine.max_parallel, 3);
    assert_eq!(reloaded.llm.model, "gpt-4o");
}
