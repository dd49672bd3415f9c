//! OpenAPI document and Swagger UI.

use axum::Router;
use serde::Serialize;
use utoipa::openapi::{server::ServerBuilder, OpenApi as OpenApiDoc};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::entity::BaseEntity;
use crate::middleware::AuthUser;

pub const DOCS_PATH: &str = "/docs";
pub const DOCS_JSON_PATH: &str = "/docs-json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pagebase API",
        description = "Backend API. Domain modules contribute their own paths."
    ),
    paths(crate::routes::health::healthz, crate::routes::health::readyz),
    components(schemas(BaseEntity, AuthUser, ErrorResponse, ErrorDetails)),
    tags((name = "health", description = "Liveness and readiness probes"))
)]
pub struct ApiDoc;

/// Uniform error body returned by every failing request.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
    #[schema(example = 404)]
    pub status: u16,
    #[schema(example = "2024-01-01T00:00:00+00:00")]
    pub timestamp: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorDetails {
    #[schema(example = "NOT_FOUND")]
    pub code: String,
    #[schema(example = "Record not found")]
    pub message: String,
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

/// The document served at `/docs-json`, with a single local server entry.
pub fn build(port: u16, extra: Option<OpenApiDoc>) -> OpenApiDoc {
    let mut doc = ApiDoc::openapi();
    if let Some(extra) = extra {
        doc.merge(extra);
    }
    doc.servers = Some(vec![ServerBuilder::new()
        .url(format!("http://localhost:{}", port))
        .description(Some("Development server"))
        .build()]);
    doc
}

pub fn router(doc: OpenApiDoc) -> Router {
    SwaggerUi::new(DOCS_PATH).url(DOCS_JSON_PATH, doc).into()
}
