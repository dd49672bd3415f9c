use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use subtle::ConstantTimeEq;

use crate::config::{AdminCredentials, Secret};
use crate::error::error_body;

/// HTTP basic authentication for a fixed set of path prefixes.
#[derive(Clone)]
pub struct BasicAuthGate {
    username: String,
    password: Secret,
    prefixes: Arc<[String]>,
}

impl BasicAuthGate {
    pub fn new(admin: &AdminCredentials, prefixes: &[&str]) -> Self {
        Self {
            username: admin.username.clone(),
            password: admin.password.clone(),
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// `/docs` gates `/docs` and `/docs/...` but not `/docsx`.
    pub fn is_gated(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| {
            path == p.as_str() || path.strip_prefix(p.as_str()).is_some_and(|rest| rest.starts_with('/'))
        })
    }

    fn check(&self, authorization: Option<&str>) -> bool {
        let Some((user, pass)) = authorization.and_then(parse_basic) else {
            return false;
        };
        let user_ok = user.as_bytes().ct_eq(self.username.as_bytes());
        let pass_ok = pass.as_bytes().ct_eq(self.password.expose().as_bytes());
        (user_ok & pass_ok).into()
    }
}

/// Decodes `Basic <base64(user:pass)>`. The password may itself contain ':'.
fn parse_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Rejects requests to gated paths without valid admin credentials.
///
/// Failures carry `WWW-Authenticate: Basic` so browsers prompt for credentials.
pub async fn basic_auth_middleware(State(gate): State<BasicAuthGate>, req: Request, next: Next) -> Response {
    if !gate.is_gated(req.uri().path()) {
        return next.run(req).await;
    }

    let authorization = req.headers().get(header::AUTHORIZATION).and_then(|h| h.to_str().ok());
    if gate.check(authorization) {
        return next.run(req).await;
    }

    tracing::warn!("Rejected unauthenticated request to {}", req.uri().path());
    let body = error_body(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Authentication required", None);
    let mut res = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    res.headers_mut().insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"docs\""));
    res
}
