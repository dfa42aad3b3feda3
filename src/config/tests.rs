use super::builder::default_config_content;
use super::validation::validate_config;
use super::*;
use serial_test::serial;
use std::fs;
use tempfile::tempdir;

fn write_config(dir: &std::path::Path, content: &str) -> PathBuf {
    let path = dir.join(CONFIG_FILE_NAME);
    fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_config_load_default_creation() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join(APP_DIR_NAME).join(CONFIG_FILE_NAME);

    let original = std::env::var("XDG_CONFIG_HOME").ok();
    unsafe {
        std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());
    }

    crate::logger::Log::set_enabled(false);
    let result = Config::load();

    unsafe {
        match original {
            Some(val) => std::env::set_var("XDG_CONFIG_HOME", val),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
    }

    let config = result.unwrap();
    assert!(config_path.exists());
    assert_eq!(config.device_id, Some(DEFAULT_DEVICE_ID));
    assert_eq!(config.retry_policy(), RetryPolicy::default());
}

#[test]
fn test_default_content_round_trips_through_validation() {
    let config: Config = toml::from_str(&default_config_content()).unwrap();
    validate_config(&config).unwrap();
    assert_eq!(config.discovery_settings(), DiscoverySettings::default());
    assert_eq!(config.worker_settings(), WorkerSettings::default());
    assert_eq!(config.portal_settings(), PortalSettings::default());
    assert_eq!(config.render_hz(), DEFAULT_RENDER_HZ);
}

#[test]
fn test_default_content_comments_are_aligned() {
    let content = default_config_content();
    let columns: Vec<usize> = content
        .lines()
        .filter(|l| l.starts_with("device_id") || l.starts_with("render_hz"))
        .filter_map(|l| l.find('#'))
        .collect();
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0], columns[1]);
}

#[test]
fn test_empty_config_uses_defaults() {
    let config = Config::default();
    validate_config(&config).unwrap();
    assert_eq!(config.sunset_window_minutes(), DEFAULT_SUNSET_WINDOW_MINUTES);
    assert_eq!(
        config.health_settings(),
        (
            Duration::from_secs(DEFAULT_HEALTH_RECONNECT_INTERVAL_SECS),
            DEFAULT_HEALTH_MAX_RECONNECTS
        )
    );
}

#[test]
fn test_load_from_path_applies_overrides() {
    let temp_dir = tempdir().unwrap();
    let path = write_config(
        temp_dir.path(),
        r#"
device_id = 7
credentials_scenario = "has_credentials"
has_credentials_max_attempts = 5
router_reboot_window = 120
retry_delay_base = 2
retry_delay_cap = 8
discovery_ttl_hours = 6
render_hz = 100
storage_dir = "/var/lib/lamplink"
"#,
    );

    let config = Config::load_from_path(&path).unwrap();
    let policy = config.retry_policy();
    assert_eq!(policy.credentials_scenario, CredentialsScenario::HasCredentials);
    assert_eq!(policy.has_credentials_max_attempts, 5);
    assert_eq!(policy.router_reboot_window, Duration::from_secs(120));
    assert_eq!(policy.retry_delay.delay(3), Duration::from_secs(8));
    assert_eq!(
        config.discovery_settings().ttl,
        Duration::from_secs(6 * 3600)
    );
    assert_eq!(config.worker_settings().device_id, 7);
    assert_eq!(config.render_hz(), 100);
    assert_eq!(config.storage_dir(), PathBuf::from("/var/lib/lamplink"));
}

#[test]
fn test_load_from_missing_path_fails() {
    let temp_dir = tempdir().unwrap();
    let missing = temp_dir.path().join("nope.toml");
    assert!(Config::load_from_path(&missing).is_err());
}

#[test]
fn test_unknown_scenario_is_a_parse_error() {
    let temp_dir = tempdir().unwrap();
    let path = write_config(temp_dir.path(), "credentials_scenario = \"first_setup\"\n");
    assert!(Config::load_from_path(&path).is_err());
}

#[test]
fn test_validation_rejects_single_discovery_url() {
    let config = Config {
        discovery_urls: Some(vec!["https://only.example.com/config.json".into()]),
        ..Default::default()
    };
    let err = validate_config(&config).unwrap_err().to_string();
    assert!(err.contains("at least 2"), "{err}");
}

#[test]
fn test_validation_rejects_bad_discovery_url() {
    let config = Config {
        discovery_urls: Some(vec![
            "https://a.example.com/config.json".into(),
            "ftp://b.example.com/config.json".into(),
        ]),
        ..Default::default()
    };
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_validation_rejects_short_portal_password() {
    let config = Config {
        portal_password: Some("short".into()),
        ..Default::default()
    };
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_validation_rejects_inverted_backoff() {
    let config = Config {
        connect_timeout_base: Some(90),
        ..Default::default()
    };
    let err = validate_config(&config).unwrap_err().to_string();
    assert!(err.contains("connect_timeout_base"), "{err}");

    let config = Config {
        retry_delay_base: Some(0),
        ..Default::default()
    };
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_validation_ranges() {
    let cases = [
        Config {
            router_reboot_window: Some(MINIMUM_ROUTER_REBOOT_WINDOW_SECS - 1),
            ..Default::default()
        },
        Config {
            render_hz: Some(MAXIMUM_RENDER_HZ + 1),
            ..Default::default()
        },
        Config {
            sunset_window_minutes: Some(0),
            ..Default::default()
        },
        Config {
            weak_signal_threshold: Some(-20),
            ..Default::default()
        },
        Config {
            has_credentials_max_attempts: Some(0),
            ..Default::default()
        },
        Config {
            fetch_interval: Some(1),
            ..Default::default()
        },
        Config {
            device_id: Some(0),
            ..Default::default()
        },
        Config {
            data_path_template: Some("/api/data".into()),
            ..Default::default()
        },
    ];
    for config in cases {
        assert!(validate_config(&config).is_err(), "accepted {config:?}");
    }
}

#[test]
fn test_boundary_values_accepted() {
    let config = Config {
        router_reboot_window: Some(MINIMUM_ROUTER_REBOOT_WINDOW_SECS),
        render_hz: Some(MINIMUM_RENDER_HZ),
        sunset_window_minutes: Some(MAXIMUM_SUNSET_WINDOW_MINUTES),
        weak_signal_threshold: Some(MINIMUM_WEAK_SIGNAL_THRESHOLD_DBM),
        has_credentials_max_attempts: Some(MAXIMUM_RETRY_ATTEMPTS),
        retry_delay_base: Some(10),
        retry_delay_cap: Some(10),
        ..Default::default()
    };
    validate_config(&config).unwrap();
}
