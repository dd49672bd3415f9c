use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::header::{CONTENT_LENGTH, CONTENT_TYPE},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::error::AppError;

/// Fields that must never leave the process in a JSON response.
#[derive(Clone)]
pub struct FieldExclusions {
    fields: Arc<[String]>,
}

impl FieldExclusions {
    pub fn new<I, T>(fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self { fields: fields.into_iter().map(Into::into).collect() }
    }

    /// Removes excluded keys at any depth. Returns whether anything was removed.
    pub fn strip(&self, value: &mut Value) -> bool {
        match value {
            Value::Object(map) => {
                let mut changed = false;
                for field in self.fields.iter() {
                    changed |= map.remove(field).is_some();
                }
                for v in map.values_mut() {
                    changed |= self.strip(v);
                }
                changed
            }
            Value::Array(items) => items.iter_mut().fold(false, |acc, v| self.strip(v) | acc),
            _ => false,
        }
    }
}

impl Default for FieldExclusions {
    fn default() -> Self {
        Self::new(["deletedAt", "deleted_at"])
    }
}

pub(crate) fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json") || ct.contains("+json"))
}

/// Rewrites JSON response bodies without the excluded fields.
pub async fn exclude_fields_middleware(
    State(exclusions): State<FieldExclusions>,
    req: Request,
    next: Next,
) -> Response {
    let res = next.run(req).await;
    if !is_json(res.headers()) {
        return res;
    }

    let (mut parts, body) = res.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => return AppError::Internal(anyhow::anyhow!("failed to buffer response: {}", e)).into_response(),
    };

    let body = match serde_json::from_slice::<Value>(&bytes) {
        Ok(mut value) => {
            if exclusions.strip(&mut value) {
                parts.headers.remove(CONTENT_LENGTH);
                Body::from(value.to_string())
            } else {
                Body::from(bytes)
            }
        }
        Err(_) => Body::from(bytes),
    };
    Response::from_parts(parts, body)
}
