//! Test suites for the bootstrap layer.
//!
//! - **config_tests**: schema validation, defaults and env-file loading
//! - **db_tests**: connection descriptor and soft-delete statements
//! - **error_tests**: error rendering
//! - **api_tests**: the assembled request pipeline
//! - **health_api_tests**: liveness and readiness probes
//! - **server_tests**: env file to listening server, end to end
//!
//! Nothing here needs a running Postgres; database handles point at a closed
//! port and fail fast.

pub mod config_tests;
pub mod error_tests;
pub mod server_tests;

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use axum::{body::to_bytes, response::Response};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;

use crate::config::{self, AppConfig};
use crate::db::{ConnectionDescriptor, Database};
use crate::state::AppState;

pub(crate) const ADMIN_USER: &str = "admin";
pub(crate) const ADMIN_PASSWORD: &str = "s3cret-admin";

pub(crate) fn test_config() -> AppConfig {
    AppConfig::from_vars(config::sample_vars()).expect("sample config is valid")
}

/// A database handle aimed at a closed port; every query fails within half a second.
pub(crate) fn unreachable_db(cfg: &AppConfig) -> Database {
    let mut descriptor = ConnectionDescriptor::from_config(&cfg.database);
    descriptor.port = 1;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_millis(500))
        .connect_lazy_with(descriptor.connect_options());
    Database { pool, descriptor }
}

pub(crate) fn test_state() -> AppState {
    let cfg = test_config();
    AppState::new(unreachable_db(&cfg), cfg)
}

pub(crate) fn basic_auth(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, pass)))
}

pub(crate) async fn body_bytes(res: Response) -> Vec<u8> {
    to_bytes(res.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub(crate) async fn body_json(res: Response) -> Value {
    serde_json::from_slice(&body_bytes(res).await).unwrap()
}

/// Writes `vars` as a quoted `KEY="value"` env file.
pub(crate) fn write_env_file(path: &Path, vars: &HashMap<String, String>) {
    let mut contents = String::new();
    for (key, value) in vars {
        writeln!(contents, "{}=\"{}\"", key, value).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
