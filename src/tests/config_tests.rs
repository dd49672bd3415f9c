use std::collections::HashMap;
use std::fs;

use crate::config::{self, AppConfig, ConfigError, ConfigValue, RuntimeMode, SCHEMA};

use super::write_env_file;

fn vars_with(key: &str, value: &str) -> HashMap<String, String> {
    let mut vars = config::sample_vars();
    vars.insert(key.to_string(), value.to_string());
    vars
}

fn vars_without(key: &str) -> HashMap<String, String> {
    let mut vars = config::sample_vars();
    vars.remove(key);
    vars
}

fn failed_keys(result: Result<AppConfig, ConfigError>) -> Vec<&'static str> {
    match result {
        Ok(cfg) => panic!("expected validation failure, got {:?}", cfg),
        Err(e) => e.failed_keys(),
    }
}

#[test]
fn test_sample_config_is_valid() {
    let cfg = AppConfig::from_vars(config::sample_vars()).unwrap();
    assert_eq!(cfg.admin.username, "admin");
    assert_eq!(cfg.admin.password.expose(), "s3cret-admin");
    assert_eq!(cfg.session_secret.expose(), "keyboard cat");
    assert_eq!(cfg.database.host, "127.0.0.1");
    assert_eq!(cfg.database.port, 5432);
    assert_eq!(cfg.database.username, "app");
    assert_eq!(cfg.database.password.expose(), "db-pass");
    assert_eq!(cfg.database.name, "pagebase");
    assert_eq!(cfg.storage.port, "9000");
    assert_eq!(cfg.storage.public_bucket, "public");
}

#[test]
fn test_each_required_key_is_enforced() {
    let required: Vec<_> = SCHEMA.iter().filter(|s| s.required).collect();
    assert_eq!(required.len(), 14);

    for spec in required {
        let result = AppConfig::from_vars(vars_without(spec.key));
        let err = result.as_ref().err().map(ToString::to_string).unwrap_or_default();
        assert_eq!(failed_keys(result), vec![spec.key], "key {}", spec.key);
        assert!(err.contains(spec.key), "message should name {}: {}", spec.key, err);
        assert!(err.contains("is required"));
    }
}

#[test]
fn test_optional_keys_get_defaults() {
    let cfg = AppConfig::from_vars(config::sample_vars()).unwrap();
    assert_eq!(cfg.mode, RuntimeMode::Development);
    assert_eq!(cfg.port, 8989);
    assert!(!cfg.storage.use_ssl);

    assert_eq!(cfg.record.get_str("NODE_ENV"), Some("development"));
    assert_eq!(cfg.record.get_number("PORT"), Some(8989.0));
    assert_eq!(cfg.record.get_bool("MINIO_USE_SSL"), Some(false));
}

#[test]
fn test_all_missing_keys_reported_together() {
    let keys = failed_keys(AppConfig::from_vars(HashMap::new()));
    assert_eq!(keys.len(), 14);
    assert!(keys.contains(&"ADMIN_USER"));
    assert!(keys.contains(&"MINIO_URL"));
    assert!(!keys.contains(&"PORT"));
}

#[test]
fn test_port_and_missing_errors_collected_together() {
    let mut vars = vars_without("DB_HOST");
    vars.insert("PORT".into(), "70000".into());
    vars.insert("DB_PORT".into(), "0".into());

    let result = AppConfig::from_vars(vars);
    let message = result.as_ref().err().map(ToString::to_string).unwrap_or_default();
    let mut keys = failed_keys(result);
    keys.sort_unstable();
    assert_eq!(keys, vec!["DB_HOST", "DB_PORT", "PORT"]);
    assert!(message.contains("\"PORT\" must be an integer port in 1..=65535"));
    assert!(message.contains("\"DB_HOST\" is required"));
}

#[test]
fn test_empty_string_rejected() {
    let result = AppConfig::from_vars(vars_with("DB_HOST", ""));
    let message = result.as_ref().err().map(ToString::to_string).unwrap_or_default();
    assert_eq!(failed_keys(result), vec!["DB_HOST"]);
    assert!(message.contains("is not allowed to be empty"));
}

#[test]
fn test_port_coercion() {
    let cfg = AppConfig::from_vars(vars_with("PORT", "3000")).unwrap();
    assert_eq!(cfg.port, 3000);
    assert_eq!(cfg.get("PORT"), Some(&ConfigValue::Number(3000.0)));

    assert_eq!(failed_keys(AppConfig::from_vars(vars_with("DB_PORT", "abc"))), vec!["DB_PORT"]);
    assert_eq!(failed_keys(AppConfig::from_vars(vars_with("PORT", "NaN"))), vec!["PORT"]);
}

#[test]
fn test_port_range() {
    assert_eq!(failed_keys(AppConfig::from_vars(vars_with("PORT", "70000"))), vec!["PORT"]);
    assert_eq!(failed_keys(AppConfig::from_vars(vars_with("DB_PORT", "54.5"))), vec!["DB_PORT"]);
    assert_eq!(failed_keys(AppConfig::from_vars(vars_with("PORT", "0"))), vec!["PORT"]);
}

#[test]
fn test_boolean_coercion() {
    let cfg = AppConfig::from_vars(vars_with("MINIO_USE_SSL", "TRUE")).unwrap();
    assert!(cfg.storage.use_ssl);
    let cfg = AppConfig::from_vars(vars_with("MINIO_USE_SSL", "false")).unwrap();
    assert!(!cfg.storage.use_ssl);
    assert_eq!(failed_keys(AppConfig::from_vars(vars_with("MINIO_USE_SSL", "yes"))), vec!["MINIO_USE_SSL"]);
}

#[test]
fn test_url_validation() {
    assert_eq!(failed_keys(AppConfig::from_vars(vars_with("MINIO_URL", "minio.local"))), vec!["MINIO_URL"]);
    assert_eq!(failed_keys(AppConfig::from_vars(vars_with("MINIO_URL", "ftp://minio.local"))), vec!["MINIO_URL"]);
    assert!(AppConfig::from_vars(vars_with("MINIO_URL", "https://cdn.example.com")).is_ok());
}

#[test]
fn test_unknown_keys_ignored() {
    let cfg = AppConfig::from_vars(vars_with("SOMETHING_ELSE", "x")).unwrap();
    assert!(cfg.get("SOMETHING_ELSE").is_none());
    assert_eq!(cfg.record.len(), SCHEMA.len());
}

#[test]
fn test_production_mode() {
    let cfg = AppConfig::from_vars(vars_with("NODE_ENV", "production")).unwrap();
    assert_eq!(cfg.mode, RuntimeMode::Production);
    assert_eq!(cfg.mode.env_file(), ".env.production");
}

#[test]
fn test_runtime_mode_detection() {
    assert_eq!(RuntimeMode::from_node_env(None), RuntimeMode::Development);
    assert_eq!(RuntimeMode::from_node_env(Some("test")), RuntimeMode::Development);
    assert_eq!(RuntimeMode::from_node_env(Some("production")), RuntimeMode::Production);
    assert_eq!(RuntimeMode::Development.env_file(), ".env.development");
}

#[test]
fn test_debug_masks_secrets() {
    let cfg = AppConfig::from_vars(config::sample_vars()).unwrap();
    let printed = format!("{:?}", cfg);
    for secret in ["s3cret-admin", "keyboard cat", "db-pass", "minio-access", "minio-secret"] {
        assert!(!printed.contains(secret), "{} leaked", secret);
    }
    assert!(printed.contains("127.0.0.1"));
}

#[test]
fn test_storage_urls() {
    let mut cfg = AppConfig::from_vars(config::sample_vars()).unwrap();
    assert_eq!(cfg.storage.endpoint_url(), "http://minio.local:9000");
    assert_eq!(cfg.storage.public_object_url("/avatars/a.png"), "http://minio.local:9000/public/avatars/a.png");
    cfg.storage.use_ssl = true;
    assert_eq!(cfg.storage.endpoint_url(), "https://minio.local:9000");
}

#[test]
fn test_read_env_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".env.development");
    fs::write(&path, "# comment\nADMIN_USER=root\nSESSION_SECRET=\"two words\"\n").unwrap();

    let vars = config::read_env_file(&path).unwrap();
    assert_eq!(vars.get("ADMIN_USER").map(String::as_str), Some("root"));
    assert_eq!(vars.get("SESSION_SECRET").map(String::as_str), Some("two words"));
    assert_eq!(vars.len(), 2);
}

#[test]
fn test_missing_env_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let vars = config::read_env_file(&dir.path().join(".env.production")).unwrap();
    assert!(vars.is_empty());
}

fn env_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_env_file(&dir.path().join(".env.development"), &vars_with("PORT", "3001"));
    write_env_file(&dir.path().join(".env.production"), &vars_with("PORT", "3002"));
    dir
}

#[test]
fn test_load_picks_env_file_by_node_env() {
    let dir = env_dir();

    let cfg = config::load_with_env(dir.path(), HashMap::new()).unwrap();
    assert_eq!(cfg.mode, RuntimeMode::Development);
    assert_eq!(cfg.port, 3001);

    let env = HashMap::from([("NODE_ENV".to_string(), "production".to_string())]);
    let cfg = config::load_with_env(dir.path(), env).unwrap();
    assert_eq!(cfg.mode, RuntimeMode::Production);
    assert_eq!(cfg.port, 3002);
}

#[test]
fn test_process_env_overrides_env_file() {
    let dir = env_dir();
    let env = HashMap::from([
        ("DB_HOST".to_string(), "db.internal".to_string()),
        ("PORT".to_string(), "4000".to_string()),
    ]);

    let cfg = config::load_with_env(dir.path(), env).unwrap();
    assert_eq!(cfg.database.host, "db.internal");
    assert_eq!(cfg.port, 4000);
    assert_eq!(cfg.database.name, "pagebase");
}

#[test]
fn test_load_without_env_file_uses_environment_only() {
    let dir = tempfile::tempdir().unwrap();
    let keys = failed_keys(config::load_with_env(dir.path(), HashMap::new()));
    assert_eq!(keys.len(), 14);

    let cfg = config::load_with_env(dir.path(), config::sample_vars()).unwrap();
    assert_eq!(cfg.port, 8989);
}
