//! HTTP server bootstrap.
//!
//! [`Application::router`] stacks the request pipeline in a fixed order,
//! outermost first:
//!
//! 1. permissive CORS
//! 2. 100 MB body limit for JSON and form bodies
//! 3. server-side sessions (signed `sid` cookie)
//! 4. cookie parsing
//! 5. basic auth in front of `/docs` and `/docs-json`
//! 6. Swagger UI and the OpenAPI document
//! 7. payload validation, done by the `Validated*` extractors in handlers
//! 8. login-state restore from the session
//! 9. JSON field exclusion (`deletedAt`)
//! 10. uniform error responses
//!
//! [`Application::listen`] then binds the configured port.

use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    http::Uri,
    middleware::{from_fn, from_fn_with_state},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::openapi::OpenApi as OpenApiDoc;

use crate::config::RuntimeMode;
use crate::docs::{self, DOCS_JSON_PATH, DOCS_PATH};
use crate::error::AppError;
use crate::middleware::{
    auth::basic_auth_middleware, auth_session::auth_session_middleware, cookies::cookie_middleware,
    error_filter::error_filter_middleware, serialize::exclude_fields_middleware, session::session_middleware,
    BasicAuthGate, FieldExclusions, SessionManager,
};
use crate::routes;
use crate::state::AppState;

/// Maximum accepted request body, for both JSON and form-encoded payloads.
pub const BODY_LIMIT: usize = 100 * 1024 * 1024;

pub struct Application {
    state: AppState,
    extra_docs: Option<OpenApiDoc>,
}

impl Application {
    pub fn new(state: AppState) -> Self {
        Self { state, extra_docs: None }
    }

    /// Merges domain paths and schemas into the served OpenAPI document.
    pub fn with_openapi(mut self, doc: OpenApiDoc) -> Self {
        match self.extra_docs.as_mut() {
            Some(existing) => existing.merge(doc),
            None => self.extra_docs = Some(doc),
        }
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Builds the full router around the given domain routes.
    pub fn router(&self, domain: Router<AppState>) -> Router {
        let cfg = &self.state.config;
        let sessions = SessionManager::new(&cfg.session_secret, self.state.sessions.clone());
        let docs_gate = BasicAuthGate::new(&cfg.admin, &[DOCS_PATH, DOCS_JSON_PATH]);
        let openapi = docs::build(cfg.port, self.extra_docs.clone());

        let api = Router::new()
            .merge(routes::health::router())
            .merge(domain)
            .layer(from_fn(error_filter_middleware))
            .layer(from_fn_with_state(FieldExclusions::default(), exclude_fields_middleware))
            .layer(from_fn(auth_session_middleware))
            .with_state(self.state.clone());

        api.merge(docs::router(openapi))
            .fallback(not_found)
            .layer(from_fn_with_state(docs_gate, basic_auth_middleware))
            .layer(from_fn(cookie_middleware))
            .layer(from_fn_with_state(sessions, session_middleware))
            .layer(DefaultBodyLimit::max(BODY_LIMIT))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Binds `0.0.0.0:PORT` and serves until a shutdown signal arrives.
    pub async fn listen(self, domain: Router<AppState>) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.port));
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, domain).await
    }

    pub async fn serve(self, listener: TcpListener, domain: Router<AppState>) -> anyhow::Result<()> {
        let app = self.router(domain);
        let port = listener.local_addr()?.port();
        info!("{}", start_message(self.state.config.mode, port));
        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
        Ok(())
    }
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Cannot find {}", uri.path()))
}

pub fn start_message(mode: RuntimeMode, port: u16) -> String {
    match mode {
        RuntimeMode::Development => format!("Server on http://localhost:{}", port),
        RuntimeMode::Production => format!("Server on port {}...", port),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received. Stopping server...");
}
