use cloudru_object_storage::{LogLevel, LoggerOptions, StorageConfig};
use std::fs;
use tempfile::TempDir;

/// Test loading a full configuration from a YAML file
#[test]
fn test_load_yaml_config() {
    let yaml = r#"
tenant_id: 11111111-2222-3333-4444-555555555555
access_key: AKIATEST
secret_key: secrettest
bucket: test-bucket
service_url: http://localhost:9000
request_timeout_secs: 30
logger:
  name: billing
  level: warn
  include_sources: false
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("storage.yaml");
    fs::write(&config_path, yaml).unwrap();

    let contents = fs::read_to_string(&config_path).unwrap();
    let config: StorageConfig = serde_yaml::from_str(&contents).unwrap();

    assert_eq!(config.tenant_id, "11111111-2222-3333-4444-555555555555");
    assert_eq!(config.access_key, "AKIATEST");
    assert_eq!(config.secret_key, "secrettest");
    assert_eq!(config.bucket, "test-bucket");
    assert_eq!(config.service_url, "http://localhost:9000");
    assert_eq!(config.request_timeout_secs, 30);

    let logger = config.logger.unwrap();
    assert_eq!(logger.name, "billing");
    assert_eq!(logger.level, LogLevel::Warn);
    assert!(!logger.include_sources);
}

/// Test that omitted settings fall back to defaults
#[test]
fn test_minimal_yaml_uses_defaults() {
    let yaml = r#"
tenant_id: t
access_key: k
secret_key: s
bucket: b
"#;

    let config: StorageConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.service_url, "https://s3.cloud.ru");
    assert_eq!(config.request_timeout_secs, 300);
    assert!(config.logger.is_none());
}

/// Test that an empty logger section enables logging with default options
#[test]
fn test_empty_logger_section() {
    let yaml = r#"
bucket: b
logger: {}
"#;

    let config: StorageConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.logger, Some(LoggerOptions::default()));
    assert!(config.tenant_id.is_empty());
}

/// Test that unknown log levels are rejected
#[test]
fn test_invalid_log_level() {
    let yaml = r#"
logger:
  level: verbose
"#;

    assert!(serde_yaml::from_str::<StorageConfig>(yaml).is_err());
}

/// Test serializing a configuration back to YAML
#[test]
fn test_yaml_round_trip_keeps_values() {
    let config = StorageConfig {
        tenant_id: "t".to_string(),
        bucket: "b".to_string(),
        logger: Some(LoggerOptions::default().with_level(LogLevel::Warn)),
        ..StorageConfig::default()
    };

    let yaml = serde_yaml::to_string(&config).unwrap();
    assert!(yaml.contains("level: warn"));
    let parsed: StorageConfig = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed, config);
}
