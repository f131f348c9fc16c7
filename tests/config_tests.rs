// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use gtin_scanner::ScannerConfig;
use std::path::PathBuf;
use std::time::Duration;

fn temp_config_path(tag: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("gtin-scanner-test-{}-{}", tag, uuid::Uuid::new_v4()))
        .join("config.json")
}

#[test]
fn test_config_default() {
    let config = ScannerConfig::default();

    // Check sensible defaults
    assert_eq!(config.poll_interval(), Duration::from_millis(50));
    assert_eq!((config.capture_width, config.capture_height), (640, 480));
    assert_eq!(config.max_decode_dimension, 640);
    assert!(config.preferred_device_id.is_none());
}

#[test]
fn test_zero_interval_still_yields() {
    let config = ScannerConfig {
        poll_interval_ms: 0,
        ..Default::default()
    };
    assert_eq!(config.poll_interval(), Duration::from_millis(1));
}

#[test]
fn test_missing_file_gives_defaults() {
    let path = temp_config_path("missing");
    assert_eq!(ScannerConfig::load_from(&path), ScannerConfig::default());
}

#[test]
fn test_save_and_load() {
    let path = temp_config_path("roundtrip");
    let config = ScannerConfig {
        poll_interval_ms: 120,
        preferred_device_id: Some("/dev/video2".to_string()),
        ..Default::default()
    };

    config.save_to(&path).unwrap();
    assert_eq!(ScannerConfig::load_from(&path), config);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_partial_file_fills_defaults() {
    let path = temp_config_path("partial");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{ "capture_width": 1280 }"#).unwrap();

    let config = ScannerConfig::load_from(&path);
    assert_eq!(config.capture_width, 1280);
    assert_eq!(config.capture_height, 480);
    assert_eq!(config.poll_interval_ms, 50);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_malformed_file_gives_defaults() {
    let path = temp_config_path("malformed");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    assert_eq!(ScannerConfig::load_from(&path), ScannerConfig::default());

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}
