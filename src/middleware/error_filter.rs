use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderValue,
    },
    middleware::Next,
    response::Response,
};
use serde_json::json;

use crate::error::{error_body, status_code_name};
use crate::middleware::serialize::is_json;

/// Plain-text error bodies larger than this are replaced by the status reason.
const MAX_ERROR_BODY: usize = 64 * 1024;

/// Turns non-JSON 4xx/5xx responses (framework rejections, plain-text handler
/// errors) into the uniform error shape. JSON errors pass through unchanged.
pub async fn error_filter_middleware(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let res = next.run(req).await;
    let status = res.status();
    if !(status.is_client_error() || status.is_server_error()) || is_json(res.headers()) {
        return res;
    }

    let (mut parts, body) = res.into_parts();
    let text = match to_bytes(body, MAX_ERROR_BODY).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(_) => String::new(),
    };
    let message = if text.is_empty() {
        status.canonical_reason().unwrap_or("Error").to_string()
    } else {
        text
    };

    if status.is_server_error() {
        tracing::error!("{} {} -> {}", status.as_u16(), path, message);
    } else {
        tracing::debug!("{} {} -> {}", status.as_u16(), path, message);
    }

    let body = error_body(status, &status_code_name(status), &message, Some(json!({ "path": path })));
    parts.headers.remove(CONTENT_LENGTH);
    parts.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Response::from_parts(parts, Body::from(body.to_string()))
}
