use super::{ENV_PREFIX, load_config, settings::Settings};
use serial_test::serial;
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.broker.host, "127.0.0.1");
    assert_eq!(settings.broker.port, 8080);
    assert!(!settings.broker.use_tls);
    assert_eq!(settings.retry.max_attempts, 4);
    assert_eq!(settings.connection.connect_timeout(), Duration::from_secs(10));
    assert_eq!(settings.connection.reconnect_cooldown(), Duration::from_secs(5));
    assert_eq!(settings.processing.delay(), Duration::from_millis(2000));
    assert_eq!(settings.processing.completion_timeout(), Duration::from_secs(30));
    assert_eq!(settings.logging.level, "info");
}

#[test]
fn retry_settings_build_policy() {
    let settings = Settings::default();
    let policy = settings.retry.policy();
    assert_eq!(policy.max_attempts(), 4);
    assert_eq!(policy.delay_for(1), Duration::from_secs(5));
}

#[test]
#[serial]
fn load_config_without_sources_uses_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    let cfg = load_config();

    env::set_current_dir(orig).expect("restore cwd");
    assert_eq!(cfg.expect("load_config failed"), Settings::default());
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    // Create a temporary directory and set it as current dir so load_config
    // will pick up config/default.toml from there.
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [broker]
        host = "broker.local"
        port = 1884
        client_id = "orders"
        use_tls = true

        [retry]
        max_attempts = 2
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();

    env::set_current_dir(orig).expect("restore cwd");
    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.broker.host, "broker.local");
    assert_eq!(cfg.broker.port, 1884);
    assert_eq!(cfg.broker.client_id, "orders");
    assert!(cfg.broker.use_tls);
    assert_eq!(cfg.retry.max_attempts, 2);
    // Untouched values keep their defaults.
    assert_eq!(cfg.retry.base_delay_ms, 5000);
    assert_eq!(cfg.processing.delay_ms, 2000);
}

#[test]
#[serial]
fn load_config_reads_environment_overrides() {
    let port_key = format!("{ENV_PREFIX}__BROKER__PORT");
    let delay_key = format!("{ENV_PREFIX}__PROCESSING__DELAY_MS");
    temp_env::with_vars(
        [(port_key.as_str(), Some("1999")), (delay_key.as_str(), Some("50"))],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.broker.port, 1999);
            assert_eq!(cfg.processing.delay_ms, 50);
        },
    );
}
