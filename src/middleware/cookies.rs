use axum::{extract::Request, middleware::Next, response::Response};
use axum_extra::extract::cookie::CookieJar;

/// Parses the `Cookie` header once and exposes it as an `Extension<CookieJar>`.
pub async fn cookie_middleware(mut req: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(req.headers());
    req.extensions_mut().insert(jar);
    next.run(req).await
}
