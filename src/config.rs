//! Environment configuration.
//!
//! Configuration comes from the process environment layered over an env file
//! picked by `NODE_ENV` (`.env.production` or `.env.development`). Every
//! recognised key is checked against [`SCHEMA`] and the result is frozen into
//! an [`AppConfig`] that is shared read-only for the rest of the process.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

/// Runtime mode selected by `NODE_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    Development,
    Production,
}

impl RuntimeMode {
    /// Anything other than `production` (including an unset variable) is development.
    pub fn from_node_env(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("production") => RuntimeMode::Production,
            _ => RuntimeMode::Development,
        }
    }

    pub fn env_file(self) -> &'static str {
        match self {
            RuntimeMode::Development => ".env.development",
            RuntimeMode::Production => ".env.production",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeMode::Development => "development",
            RuntimeMode::Production => "production",
        }
    }

    pub fn is_production(self) -> bool {
        self == RuntimeMode::Production
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Bool,
    /// Integer TCP port in 1..=65535, stored as a number.
    Port,
    /// Absolute http(s) URL, stored as a string.
    Url,
}

/// One entry of the validation schema.
#[derive(Debug, Clone, Copy)]
pub struct KeySpec {
    pub key: &'static str,
    pub kind: ValueKind,
    pub required: bool,
    pub default: Option<&'static str>,
}

const fn required(key: &'static str, kind: ValueKind) -> KeySpec {
    KeySpec { key, kind, required: true, default: None }
}

const fn optional(key: &'static str, kind: ValueKind, default: &'static str) -> KeySpec {
    KeySpec { key, kind, required: false, default: Some(default) }
}

pub const DEFAULT_PORT: u16 = 8989;

/// Every key the application recognises. Keys outside this list are ignored.
pub const SCHEMA: &[KeySpec] = &[
    optional("NODE_ENV", ValueKind::Str, "development"),
    optional("PORT", ValueKind::Port, "8989"),
    required("ADMIN_USER", ValueKind::Str),
    required("ADMIN_PASSWORD", ValueKind::Str),
    required("SESSION_SECRET", ValueKind::Str),
    required("DB_USERNAME", ValueKind::Str),
    required("DB_PASSWORD", ValueKind::Str),
    required("DB_HOST", ValueKind::Str),
    required("DB_PORT", ValueKind::Port),
    required("DB_NAME", ValueKind::Str),
    required("MINIO_ENDPOINT", ValueKind::Str),
    required("MINIO_PORT", ValueKind::Str),
    optional("MINIO_USE_SSL", ValueKind::Bool, "false"),
    required("MINIO_ACCESS_KEY", ValueKind::Str),
    required("MINIO_SECRET_KEY", ValueKind::Str),
    required("MINIO_PUBLIC_BUCKET_NAME", ValueKind::Str),
    required("MINIO_URL", ValueKind::Url),
];

/// Keys whose values are masked whenever configuration is printed.
const SECRET_KEYS: &[&str] =
    &["ADMIN_PASSWORD", "SESSION_SECRET", "DB_PASSWORD", "MINIO_ACCESS_KEY", "MINIO_SECRET_KEY"];

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Str(String),
    Number(f64),
    Bool(bool),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Str(s) => f.write_str(s),
            ConfigValue::Number(n) => write!(f, "{}", n),
            ConfigValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A string that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"***\"")
    }
}

/// Validated key/value view of the configuration.
#[derive(Clone, Default, PartialEq)]
pub struct ConfigRecord {
    values: BTreeMap<&'static str, ConfigValue>,
}

impl ConfigRecord {
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(ConfigValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(ConfigValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(ConfigValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn string(&self, key: &'static str) -> Result<String, FieldError> {
        self.get_str(key)
            .map(str::to_string)
            .ok_or_else(|| FieldError::new(key, "is required"))
    }

    fn port(&self, key: &'static str) -> Result<u16, FieldError> {
        self.get_number(key)
            .and_then(port_number)
            .ok_or_else(|| FieldError::new(key, "must be an integer port in 1..=65535"))
    }
}

impl fmt::Debug for ConfigRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.values {
            if SECRET_KEYS.contains(key) {
                map.entry(key, &"***");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// A single key that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub key: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(key: &'static str, message: impl Into<String>) -> Self {
        Self { key, message: message.into() }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" {}", self.key, self.message)
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(". ")
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config validation error: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),
    #[error("failed to read env file {}: {source}", .path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("failed to collect environment: {0}")]
    Source(#[from] ::config::ConfigError),
}

impl ConfigError {
    /// Keys that failed validation, empty for non-validation errors.
    pub fn failed_keys(&self) -> Vec<&'static str> {
        match self {
            ConfigError::Validation(errors) => errors.iter().map(|e| e.key).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: Secret,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ObjectStorageConfig {
    pub endpoint: String,
    pub port: String,
    pub use_ssl: bool,
    pub access_key: Secret,
    pub secret_key: Secret,
    pub public_bucket: String,
    pub url: String,
}

impl ObjectStorageConfig {
    /// API endpoint of the object store, e.g. `http://minio:9000`.
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.endpoint, self.port)
    }

    /// Public URL of an object stored in the public bucket.
    pub fn public_object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.url.trim_end_matches('/'),
            self.public_bucket,
            key.trim_start_matches('/')
        )
    }
}

/// The validated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: RuntimeMode,
    pub port: u16,
    pub admin: AdminCredentials,
    pub session_secret: Secret,
    pub database: DatabaseConfig,
    pub storage: ObjectStorageConfig,
    pub record: ConfigRecord,
}

impl AppConfig {
    /// Validates a raw variable map against [`SCHEMA`].
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let source = ::config::Config::builder()
            .add_source(::config::Environment::default().source(Some(vars)))
            .build()?;

        let record = validate(&source)?;
        Self::from_record(record)
    }

    /// Builds the typed view from an already validated record.
    pub fn from_record(record: ConfigRecord) -> Result<Self, ConfigError> {
        let build = || -> Result<AppConfig, FieldError> {
            Ok(AppConfig {
                mode: RuntimeMode::from_node_env(record.get_str("NODE_ENV")),
                port: record.port("PORT")?,
                admin: AdminCredentials {
                    username: record.string("ADMIN_USER")?,
                    password: Secret::new(record.string("ADMIN_PASSWORD")?),
                },
                session_secret: Secret::new(record.string("SESSION_SECRET")?),
                database: DatabaseConfig {
                    host: record.string("DB_HOST")?,
                    port: record.port("DB_PORT")?,
                    username: record.string("DB_USERNAME")?,
                    password: Secret::new(record.string("DB_PASSWORD")?),
                    name: record.string("DB_NAME")?,
                },
                storage: ObjectStorageConfig {
                    endpoint: record.string("MINIO_ENDPOINT")?,
                    port: record.string("MINIO_PORT")?,
                    use_ssl: record.get_bool("MINIO_USE_SSL").unwrap_or(false),
                    access_key: Secret::new(record.string("MINIO_ACCESS_KEY")?),
                    secret_key: Secret::new(record.string("MINIO_SECRET_KEY")?),
                    public_bucket: record.string("MINIO_PUBLIC_BUCKET_NAME")?,
                    url: record.string("MINIO_URL")?,
                },
                record: record.clone(),
            })
        };
        build().map_err(|e| ConfigError::Validation(vec![e]))
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.record.get(key)
    }
}

fn validate(source: &::config::Config) -> Result<ConfigRecord, ConfigError> {
    let mut record = ConfigRecord::default();
    let mut errors = Vec::new();

    for spec in SCHEMA {
        // The config crate lowercases environment keys on collection.
        let raw = match source.get_string(&spec.key.to_ascii_lowercase()) {
            Ok(value) => Some(value),
            Err(::config::ConfigError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let raw = match (raw, spec.default) {
            (Some(value), _) => value,
            (None, Some(default)) => default.to_string(),
            (None, None) => {
                errors.push(FieldError::new(spec.key, "is required"));
                continue;
            }
        };

        match coerce(spec.kind, &raw) {
            Ok(value) => {
                record.values.insert(spec.key, value);
            }
            Err(message) => errors.push(FieldError::new(spec.key, message)),
        }
    }

    if errors.is_empty() {
        Ok(record)
    } else {
        Err(ConfigError::Validation(errors))
    }
}

fn coerce(kind: ValueKind, raw: &str) -> Result<ConfigValue, &'static str> {
    match kind {
        ValueKind::Str => {
            if raw.is_empty() {
                Err("is not allowed to be empty")
            } else {
                Ok(ConfigValue::Str(raw.to_string()))
            }
        }
        ValueKind::Port => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(port_number)
            .map(|port| ConfigValue::Number(f64::from(port)))
            .ok_or("must be an integer port in 1..=65535"),
        ValueKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(ConfigValue::Bool(true)),
            "false" => Ok(ConfigValue::Bool(false)),
            _ => Err("must be a boolean"),
        },
        ValueKind::Url => match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(ConfigValue::Str(raw.to_string())),
            _ => Err("must be a valid http(s) URL"),
        },
    }
}

fn port_number(n: f64) -> Option<u16> {
    (n.fract() == 0.0 && (1.0..=65535.0).contains(&n)).then_some(n as u16)
}

/// Reads `KEY=value` pairs from an env file. A missing file yields an empty map.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => {
            tracing::warn!("Env file {} not found, using process environment only", path.display());
            return Ok(HashMap::new());
        }
        Err(source) => return Err(ConfigError::EnvFile { path: path.to_path_buf(), source }),
    };
    iter.map(|item| item.map_err(|source| ConfigError::EnvFile { path: path.to_path_buf(), source }))
        .collect()
}

/// Loads configuration from the env file in the working directory plus the process environment.
pub fn load() -> Result<AppConfig, ConfigError> {
    load_from_dir(Path::new("."))
}

pub fn load_from_dir(dir: &Path) -> Result<AppConfig, ConfigError> {
    let process_env =
        std::env::vars_os().filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))).collect();
    load_with_env(dir, process_env)
}

/// Picks the env file in `dir` from `NODE_ENV` in `env`, then layers `env` over the file.
pub fn load_with_env(dir: &Path, env: HashMap<String, String>) -> Result<AppConfig, ConfigError> {
    let mode = RuntimeMode::from_node_env(env.get("NODE_ENV").map(String::as_str));
    let path = dir.join(mode.env_file());
    let mut vars = read_env_file(&path)?;
    // Process environment wins over the file, like dotenv.
    vars.extend(env);
    let cfg = AppConfig::from_vars(vars)?;
    tracing::info!("Loaded {} configuration ({} keys) from {}", cfg.mode, cfg.record.len(), path.display());
    Ok(cfg)
}

/// A complete, valid variable set for tests.
#[cfg(test)]
pub(crate) fn sample_vars() -> HashMap<String, String> {
    [
        ("ADMIN_USER", "admin"),
        ("ADMIN_PASSWORD", "s3cret-admin"),
        ("SESSION_SECRET", "keyboard cat"),
        ("DB_USERNAME", "app"),
        ("DB_PASSWORD", "db-pass"),
        ("DB_HOST", "127.0.0.1"),
        ("DB_PORT", "5432"),
        ("DB_NAME", "pagebase"),
        ("MINIO_ENDPOINT", "minio.local"),
        ("MINIO_PORT", "9000"),
        ("MINIO_ACCESS_KEY", "minio-access"),
        ("MINIO_SECRET_KEY", "minio-secret"),
        ("MINIO_PUBLIC_BUCKET_NAME", "public"),
        ("MINIO_URL", "http://minio.local:9000"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
