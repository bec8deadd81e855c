//! Tests for engine configuration loading

use std::time::Duration;

use anchor_overlay::records::Color;
use anchor_overlay::EngineConfig;
use tempfile::TempDir;

#[test]
fn test_defaults_match_engine_thresholds() {
    let config = EngineConfig::default();
    assert_eq!(config.quality_threshold, 0.6);
    assert_eq!(config.quality_sample_interval(), Duration::from_millis(500));
    assert_eq!(config.disappear_distance_sq, 55.0);
    assert_eq!(config.min_guidance_distance, 0.2);
    assert_eq!(config.max_guidance_distance, 10.0);
    assert_eq!(config.quad_scale, 1.8);
    assert_eq!(config.default_video_params().key_color, Color::GREEN);
    assert!(config.background_video_params().is_background);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_file_overrides_only_given_keys() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        "quality_threshold = 0.75\nmax_in_flight_resolves = 8\n\n[default_key_color]\nred = 0.0\ngreen = 0.0\nblue = 1.0\n",
    )
    .expect("Failed to write config");

    let config = EngineConfig::load(&path).expect("Load failed");
    assert_eq!(config.quality_threshold, 0.75);
    assert_eq!(config.max_in_flight_resolves, 8);
    assert_eq!(config.default_key_color, Color::new(0.0, 0.0, 1.0));
    assert_eq!(config.disappear_distance_sq, 55.0);
}

#[test]
fn test_invalid_values_are_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "min_guidance_distance = 12.0\n").expect("Failed to write config");
    crate::assert_error_contains!(EngineConfig::load(&path), "Guidance bounds are inverted");

    let config = EngineConfig {
        max_in_flight_resolves: 0,
        ..EngineConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_missing_file_is_an_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    crate::assert_error_contains!(
        EngineConfig::load(&temp_dir.path().join("absent.toml")),
        "Failed to read config file"
    );
}

#[test]
fn test_default_path_is_under_app_directory() {
    if let Some(path) = EngineConfig::default_path() {
        assert!(path.ends_with("anchor-overlay/config.toml"));
    }
}
