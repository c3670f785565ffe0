// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use keyboard_anywhere::Config;
use keyboard_anywhere::config::SourceKind;
use std::time::Duration;

#[test]
fn test_config_default() {
    // Test that default config can be created
    let config = Config::default();

    // Check sensible defaults
    assert_eq!(config.sensor.source, SourceKind::Kinect);
    assert_eq!(config.keyboard.num_keys, 22);
    assert!(config.audio.enabled, "MIDI output should be enabled by default");
    assert!(config.validate().is_ok(), "Defaults must pass validation");
}

#[test]
fn test_config_file_round_trip() {
    let dir = std::env::temp_dir().join(format!("kb-config-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.toml");

    let mut config = Config::default();
    config.keyboard.start_key = 7;
    config.keyboard.num_keys = 14;
    config.audio.port = Some("FLUID".to_string());
    config.detection.release_debounce_ms = 250;
    std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

    let loaded = Config::load_or_default(Some(&path)).unwrap();
    std::fs::remove_dir_all(&dir).ok();

    assert_eq!(loaded, config);
    assert_eq!(
        loaded.detection.release_debounce(),
        Duration::from_millis(250)
    );
}

#[test]
fn test_explicit_missing_config_is_an_error() {
    let path = std::env::temp_dir().join(format!("kb-missing-{}.toml", uuid::Uuid::new_v4()));
    assert!(Config::load_or_default(Some(&path)).is_err());
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = std::env::temp_dir().join(format!("kb-config-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.toml");
    std::fs::write(&path, "[audio]\nchannel = 16\n").unwrap();

    let result = Config::load(&path);
    std::fs::remove_dir_all(&dir).ok();

    assert!(result.is_err(), "MIDI channel 16 is out of range");
}
