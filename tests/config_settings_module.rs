use sitelift::config::{load_settings_from, ConfigError, Settings, StoreBackend};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

fn parse(raw: &str) -> Settings {
    serde_yaml::from_str(raw).expect("parse settings")
}

fn validation_message(raw: &str) -> String {
    match parse(raw).validate() {
        Err(ConfigError::Settings(message)) => message,
        other => panic!("expected settings error, got {other:?}"),
    }
}

#[test]
fn missing_config_file_yields_defaults() {
    let temp = tempdir().expect("tempdir");
    let settings = load_settings_from(&temp.path().join("config.yaml")).expect("defaults");
    assert_eq!(settings.store, StoreBackend::File);
    assert_eq!(settings.time_scale, 1.0);
    assert!(settings.state_root.is_none());
    assert!(settings.profiles.is_empty());
}

#[test]
fn full_config_file_is_loaded() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("config.yaml");
    fs::write(
        &path,
        format!(
            r#"
state_root: {}
store: sqlite
time_scale: 0.01
actor: ops-team
persistence:
  max_attempts: 3
  initial_backoff_ms: 50
  max_backoff_ms: 400
driver:
  max_consecutive_failures: 2
profiles:
  headless:
    - name: Export Content
      estimated_duration: 2m
"#,
            temp.path().display()
        ),
    )
    .expect("write config");

    let settings = load_settings_from(&path).expect("load");
    assert_eq!(settings.store, StoreBackend::Sqlite);
    assert_eq!(
        settings.resolve_state_root().expect("state root"),
        temp.path()
    );
    assert_eq!(
        settings.actor.as_ref().map(|actor| actor.as_str()),
        Some("ops-team")
    );
    let retry = settings.retry_policy();
    assert_eq!(retry.max_attempts, 3);
    assert_eq!(retry.initial_backoff, Duration::from_millis(50));
    assert_eq!(retry.max_backoff, Duration::from_millis(400));
    let driver = settings.driver_options();
    assert_eq!(driver.time_scale, 0.01);
    assert_eq!(driver.max_consecutive_failures, 2);
    assert_eq!(
        settings.profiles.values().next().expect("profile")[0].estimated_duration,
        Duration::from_secs(120)
    );
}

#[test]
fn invalid_yaml_is_a_parse_error() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("config.yaml");
    fs::write(&path, "store: [file").expect("write config");
    assert!(matches!(
        load_settings_from(&path),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn unknown_keys_are_rejected() {
    assert!(serde_yaml::from_str::<Settings>("workspaces_path: /tmp\n").is_err());
    assert!(serde_yaml::from_str::<Settings>("persistence:\n  retries: 2\n").is_err());
}

#[test]
fn validation_rejects_bad_values() {
    assert!(validation_message("state_root: relative/path\n").contains("absolute"));
    assert!(validation_message("time_scale: 0\n").contains("time_scale"));
    assert!(validation_message("time_scale: -2.5\n").contains("time_scale"));
    assert!(validation_message("persistence:\n  max_attempts: 0\n").contains("max_attempts"));
    assert!(validation_message(
        "persistence:\n  initial_backoff_ms: 500\n  max_backoff_ms: 100\n"
    )
    .contains("max_backoff_ms"));
    assert!(
        validation_message("driver:\n  max_consecutive_failures: 0\n")
            .contains("max_consecutive_failures")
    );
    assert!(validation_message("profiles:\n  empty: []\n").contains("at least one step"));
    assert!(validation_message(
        "profiles:\n  dup:\n    - name: A\n      estimated_duration: 1s\n    - name: A\n      estimated_duration: 2s\n"
    )
    .contains("duplicate step name"));
    assert!(validation_message(
        "profiles:\n  zero:\n    - name: A\n      estimated_duration: 0s\n"
    )
    .contains("must be positive"));
}

#[test]
fn malformed_duration_fails_to_parse() {
    assert!(serde_yaml::from_str::<Settings>(
        "profiles:\n  p:\n    - name: A\n      estimated_duration: soon\n"
    )
    .is_err());
}
