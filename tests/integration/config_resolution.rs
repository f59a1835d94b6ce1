//! Config resolution through the environment, and loaded settings in use.

use std::env;
use std::sync::Arc;

use tempfile::TempDir;

use mcam::bridge::mock::MockBridge;
use mcam::config::{ConfigSearch, SAMPLE_CONFIG, load};
use mcam::device::DeviceManager;
use mcam::error::McError;

use crate::common::env::with_config_env;
use crate::common::fixtures::{TEST_CONFIG, write_config};

const TOML_CONFIG: &str = r#"
[settings]
request_timeout_seconds = 12.5
adb_command_timeout_seconds = 3

[settings.camera_defaults]
package = "com.example.camera"
activity = ".MainActivity"
photo_location = "/sdcard/DCIM/Camera"
zoom_point = { x = 100, y = 200 }
skip_zoom = true

[server]
bind = "0.0.0.0:9000"
api_token = "abc"
"#;

fn isolated(search: ConfigSearch) -> ConfigSearch {
    ConfigSearch {
        include_defaults: false,
        ..search
    }
}

#[test]
fn test_config_path_env_is_used() {
    let temp = TempDir::new().unwrap();
    let path = write_config(temp.path(), "custom.yaml", TEST_CONFIG);
    let path_str = path.to_string_lossy().to_string();

    let _env = with_config_env(Some(&path_str), None);
    let loaded = load(&ConfigSearch::from_env(None)).unwrap();
    assert_eq!(loaded.path, path);
    assert_eq!(loaded.config.settings.camera_defaults.package, "com.example.camera");
}

#[test]
fn test_cli_override_beats_env() {
    let temp = TempDir::new().unwrap();
    let from_env = write_config(temp.path(), "env.yaml", TEST_CONFIG);
    let from_cli = write_config(temp.path(), "cli.yaml", TEST_CONFIG);
    let env_str = from_env.to_string_lossy().to_string();

    let _env = with_config_env(Some(&env_str), None);
    let loaded = load(&ConfigSearch::from_env(Some(from_cli.clone()))).unwrap();
    assert_eq!(loaded.path, from_cli);
}

#[test]
fn test_missing_explicit_path_is_not_found() {
    let _env = with_config_env(Some("/definitely/not/here.yaml"), None);
    match load(&ConfigSearch::from_env(None)) {
        Err(McError::ConfigNotFound { searched }) => {
            assert_eq!(searched, vec!["/definitely/not/here.yaml"]);
        }
        other => panic!("expected ConfigNotFound, got {other:?}"),
    }
}

#[test]
fn test_search_paths_env_is_ordered() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("missing.yaml");
    let first = write_config(temp.path(), "a/config.yaml", TEST_CONFIG);
    let second = write_config(temp.path(), "b/config.yaml", TEST_CONFIG);
    let joined = env::join_paths([missing, first.clone(), second]).unwrap();
    let joined = joined.to_string_lossy().to_string();

    let _env = with_config_env(None, Some(&joined));
    let loaded = load(&isolated(ConfigSearch::from_env(None))).unwrap();
    assert_eq!(loaded.path, first);
}

#[test]
fn test_toml_config_loads() {
    let temp = TempDir::new().unwrap();
    let path = write_config(temp.path(), "mcam.toml", TOML_CONFIG);

    let _env = with_config_env(None, None);
    let loaded = load(&ConfigSearch::from_env(Some(path))).unwrap();
    let settings = &loaded.config.settings;
    assert_eq!(settings.request_timeout.as_millis(), 12_500);
    assert_eq!(settings.command_timeout.as_secs(), 3);
    assert!(settings.camera_defaults.skip_zoom);
    assert_eq!(loaded.config.server.bind, "0.0.0.0:9000");
    assert_eq!(loaded.config.server.api_token.as_deref(), Some("abc"));
}

#[test]
fn test_sample_config_is_valid() {
    let temp = TempDir::new().unwrap();
    let path = write_config(temp.path(), "config.yaml", SAMPLE_CONFIG);

    let _env = with_config_env(None, None);
    let loaded = load(&ConfigSearch::from_env(Some(path))).unwrap();
    assert_eq!(loaded.config.settings.request_timeout.as_secs(), 30);
    assert!(loaded.config.server.api_token.is_none());
}

#[test]
fn test_invalid_configs_are_rejected() {
    let temp = TempDir::new().unwrap();
    let cases = [
        (
            "traversal.yaml",
            TEST_CONFIG.replace("/sdcard/DCIM/Camera", "/sdcard/../etc"),
            "config_invalid",
        ),
        (
            "injection.yaml",
            TEST_CONFIG.replace("com.example.camera", "com.example;reboot"),
            "config_invalid",
        ),
        (
            "zero_timeout.yaml",
            TEST_CONFIG.replace("request_timeout_seconds: 10", "request_timeout_seconds: 0"),
            "config_invalid",
        ),
        (
            "label.yaml",
            TEST_CONFIG.replace(
                "settings:\n",
                "settings:\n  positions:\n    - { serial: AAA, label: ../outside }\n",
            ),
            "config_invalid",
        ),
        ("garbage.yaml", "settings: [unclosed".to_string(), "config_parse"),
        ("config.ini", TEST_CONFIG.to_string(), "config_parse"),
    ];

    let _env = with_config_env(None, None);
    for (name, content, code) in cases {
        let path = write_config(temp.path(), name, &content);
        let err = load(&ConfigSearch::from_env(Some(path))).unwrap_err();
        assert_eq!(err.code(), code, "{name}: {err}");
    }
}

#[tokio::test]
async fn test_position_table_orders_discovery() {
    let temp = TempDir::new().unwrap();
    let content = TEST_CONFIG.replace(
        "settings:\n",
        "settings:\n  positions:\n    - { serial: ZZZ, label: front }\n    - { serial: AAA, label: back }\n",
    );
    let path = write_config(temp.path(), "positions.yaml", &content);
    let loaded = mcam::config::load_config(&path).unwrap();

    let bridge = Arc::new(MockBridge::new(["AAA", "MMM", "ZZZ"]));
    let devices = DeviceManager::from_settings(bridge, &loaded.settings)
        .discover()
        .await
        .unwrap();

    let order: Vec<(&str, &str)> = devices
        .iter()
        .map(|d| (d.serial.as_str(), d.position.label.as_str()))
        .collect();
    assert_eq!(order[0], ("ZZZ", "front"));
    assert_eq!(order[1], ("AAA", "back"));
    assert_eq!(order[2].0, "MMM");
}
