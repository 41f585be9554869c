//! Config loading, TOML parsing, and validation tests.

use std::fs;

use refseeker::config::{Config, FkMetric, PkMetric};

fn write_config(dir: &tempfile::TempDir, body: &str) -> String {
    let path = dir.path().join("refseeker.toml");
    fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

// Default Configuration Tests

#[test]
fn test_config_default_discovery() {
    let config = Config::default();
    assert_eq!(config.discovery.max_uac_attributes, 3);
    assert_eq!(config.discovery.primary_keys.max_value_length, 10);
    assert_eq!(
        config.discovery.primary_keys.name_suffix,
        vec!["id", "key", "nr"]
    );
    assert_eq!(config.discovery.inclusion_dependencies.speed_mode, 0);
    assert!(!config.discovery.inclusion_dependencies.find_max_ind);
}

#[test]
fn test_config_default_metrics() {
    let config = Config::default();
    assert_eq!(config.discovery.metrics.pk_metric, PkMetric::Hopf);
    assert_eq!(config.discovery.metrics.fk_metric, FkMetric::Hopf);
}

#[test]
fn test_config_default_http_and_logging() {
    let config = Config::default();
    assert_eq!(config.http.addr, "127.0.0.1:8001");
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "text");
}

// File Loading Tests

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[discovery]
max_uac_attributes = 4

[discovery.primary_keys]
max_value_length = 16
name_suffix = ["id", "ref"]

[discovery.inclusion_dependencies]
speed_mode = 5
find_max_ind = true

[discovery.metrics]
pk_metric = "iris"
fk_metric = "hybrid_only_name"

[logging]
level = "debug"
"#,
    );
    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.discovery.max_uac_attributes, 4);
    assert_eq!(config.discovery.primary_keys.max_value_length, 16);
    assert_eq!(config.discovery.primary_keys.name_suffix, vec!["id", "ref"]);
    assert_eq!(config.discovery.inclusion_dependencies.speed_mode, 5);
    assert_eq!(config.discovery.inclusion_dependencies.num_samples(), 18);
    assert!(config.discovery.inclusion_dependencies.find_max_ind);
    assert_eq!(config.discovery.metrics.pk_metric, PkMetric::Iris);
    assert_eq!(config.discovery.metrics.fk_metric, FkMetric::HybridOnlyName);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_config_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[discovery]
max_uac_attributes = 2
"#,
    );
    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.discovery.max_uac_attributes, 2);
    assert_eq!(config.discovery.primary_keys.max_value_length, 10);
    assert_eq!(config.discovery.metrics.fk_metric, FkMetric::Hopf);
}

// Validation Tests

#[test]
fn test_config_rejects_out_of_range_speed_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[discovery.inclusion_dependencies]
speed_mode = 11
"#,
    );
    let error = Config::from_file(&path).unwrap_err();
    assert!(error.to_string().contains("speed_mode"));
}

#[test]
fn test_config_rejects_zero_uac_bound() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[discovery]
max_uac_attributes = 0
"#,
    );
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_config_rejects_unknown_metric() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[discovery.metrics]
fk_metric = "bogus"
"#,
    );
    let error = Config::from_file(&path).unwrap_err();
    assert!(error.to_string().contains("configuration error"));
}
