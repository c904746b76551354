use serial_test::serial;
use temp_env::with_vars;

use super::*;
use crate::Error;

fn cleanup_all_arn_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("ARN__") || key == CONFIG_PATH_ENV {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = Settings::default();

    assert_eq!(config.dispatch.max_batch_items, 1000);
    assert_eq!(config.dispatch.inline_size, 42000);
    assert_eq!(config.dispatch.errors_capacity, 1);
    assert_eq!(config.dispatch.queue_capacity, 1);
    assert!(config.http.compression);
    assert_eq!(config.http.request_timeout_ms, 30_000);
    assert!(config.blob.endpoint.is_none());
    assert_eq!(config.blob.sas_expiry_hours, 168);
    assert!(config.monitoring.metrics_enabled);
    assert_eq!(config.monitoring.namespace, "arn_sdk");
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn load_without_sources_uses_defaults() {
    cleanup_all_arn_env_vars();
    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let config = Settings::load(None).unwrap();
        assert_eq!(config.dispatch.max_batch_items, 1000);
        assert_eq!(config.retry.max_retries, 3);
    });
}

#[test]
#[serial]
fn load_should_merge_environment_overrides() {
    cleanup_all_arn_env_vars();
    with_vars(
        vec![
            ("ARN__DISPATCH__MAX_BATCH_ITEMS", Some("500")),
            ("ARN__HTTP__COMPRESSION", Some("false")),
        ],
        || {
            let config = Settings::load(None).unwrap();

            assert_eq!(config.dispatch.max_batch_items, 500);
            assert!(!config.http.compression);
        },
    );
}

#[test]
#[serial]
fn load_should_merge_file_settings() {
    cleanup_all_arn_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("client.toml");

    std::fs::write(
        &config_path,
        r#"
        [http]
        endpoint = "https://receiver.example.com"

        [blob]
        endpoint = "https://account.blob.core.windows.net"
        container_ext = "team-a"

        [retry]
        max_retries = 5
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let config = Settings::load(config_path.to_str()).unwrap();

        assert_eq!(config.http.endpoint, "https://receiver.example.com");
        assert_eq!(
            config.blob.endpoint.as_deref(),
            Some("https://account.blob.core.windows.net")
        );
        assert_eq!(config.blob.container_ext, "team-a");
        assert_eq!(config.retry.max_retries, 5);
        // Untouched fields keep defaults.
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(config.dispatch.inline_size, 42000);
    });
}

#[test]
#[serial]
fn environment_overrides_win_over_files() {
    cleanup_all_arn_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("client.toml");
    std::fs::write(&config_path, "[dispatch]\nmax_batch_items = 10\n").unwrap();

    with_vars(
        vec![
            (CONFIG_PATH_ENV, config_path.to_str()),
            ("ARN__DISPATCH__MAX_BATCH_ITEMS", Some("20")),
        ],
        || {
            let config = Settings::load(None).unwrap();
            assert_eq!(config.dispatch.max_batch_items, 20);
        },
    );
}

#[test]
#[serial]
fn config_path_env_file_is_loaded() {
    cleanup_all_arn_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("env.toml");
    std::fs::write(&config_path, "[monitoring]\nnamespace = \"custom\"\n").unwrap();

    with_vars(vec![(CONFIG_PATH_ENV, config_path.to_str())], || {
        let config = Settings::load(None).unwrap();
        assert_eq!(config.monitoring.namespace, "custom");
    });
}

#[test]
#[serial]
fn load_fails_for_missing_file() {
    cleanup_all_arn_env_vars();
    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let result = Settings::load(Some("/nonexistent/arn-client.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    });
}

#[test]
#[serial]
fn load_rejects_invalid_values() {
    cleanup_all_arn_env_vars();
    with_vars(vec![("ARN__DISPATCH__MAX_BATCH_ITEMS", Some("1001"))], || {
        let result = Settings::load(None);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    });
}

#[test]
fn validation_should_fail_with_invalid_dispatch_config() {
    let mut config = Settings::default();
    config.dispatch.queue_capacity = 0;
    assert!(config.validate().is_err());

    let mut config = Settings::default();
    config.dispatch.max_batch_items = 0;
    assert!(config.validate().is_err());

    let mut config = Settings::default();
    config.dispatch.errors_capacity = 0;
    assert!(config.validate().is_err());
}

#[test]
fn validation_should_fail_with_invalid_endpoints() {
    let mut config = Settings::default();
    config.http.endpoint = "not a url".into();
    assert!(config.validate().is_err());

    let mut config = Settings::default();
    config.http.endpoint = "ftp://receiver".into();
    assert!(config.validate().is_err());

    let mut config = Settings::default();
    config.blob.endpoint = Some("::".into());
    assert!(config.validate().is_err());
}

#[test]
fn container_ext_rules() {
    assert!(blob::is_valid_container_ext("team-a1"));
    assert!(blob::is_valid_container_ext(&"a".repeat(41)));
    assert!(!blob::is_valid_container_ext(&"a".repeat(42)));
    assert!(!blob::is_valid_container_ext("Team"));
    assert!(!blob::is_valid_container_ext("team_a"));
    assert!(!blob::is_valid_container_ext(""));

    let mut config = Settings::default();
    config.blob.container_ext = "UPPER".into();
    assert!(config.validate().is_err());
}

#[test]
fn validation_should_fail_with_bad_retry_or_namespace() {
    let mut config = Settings::default();
    config.retry.base_delay_ms = 10_000;
    assert!(config.validate().is_err());

    let mut config = Settings::default();
    config.monitoring.namespace = "9bad".into();
    assert!(config.validate().is_err());

    config.monitoring.metrics_enabled = false;
    assert!(config.validate().is_ok());
}
