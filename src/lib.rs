//! # Pagebase Backend Library
//!
//! The bootstrap layer of a web backend: validated environment configuration,
//! a Postgres connection factory with entity schema synchronisation, the
//! shared base-record shape, and the HTTP server pipeline (CORS, sessions,
//! basic-auth-gated API docs, validation, login state, response shaping).
//!
//! ## Architecture
//!
//! The application is built using:
//! - **Axum**: HTTP server, routing and middleware
//! - **SQLx**: Asynchronous Postgres access
//! - **Tokio**: Async runtime
//! - **utoipa**: OpenAPI document and Swagger UI
//!
//! ## Core Components
//!
//! - [`config`]: Env-file selection and schema validation
//! - [`db`]: Connection descriptor, pool and schema synchronisation
//! - [`docs`]: OpenAPI document served behind basic auth
//! - [`entity`]: Base entity, naming strategy and entity registry
//! - [`error`]: Centralized error handling and HTTP error responses
//! - [`middleware`]: Request pipeline stages and validating extractors
//! - [`routes`]: Health probes
//! - [`server`]: Pipeline assembly and listener startup
//! - [`state`]: Shared application state

pub mod config;
pub mod db;
pub mod docs;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

#[cfg(test)]
mod tests;
