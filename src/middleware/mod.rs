//! Middleware components for HTTP request processing.
//!
//! Each module covers one stage of the request pipeline assembled in
//! [`crate::server`]: sessions and cookies, basic-auth gating of the docs,
//! login-state restore, response field exclusion, error shaping, plus the
//! validating extractors handlers use for request payloads.

pub mod auth;
pub mod auth_session;
pub mod cookies;
pub mod error_filter;
pub mod serialize;
pub mod session;
pub mod validation;

pub use auth::BasicAuthGate;
pub use auth_session::{AuthSession, AuthUser, CurrentUser, RequireUser};
pub use serialize::FieldExclusions;
pub use session::{Session, SessionManager, SessionStore};
pub use validation::{ValidatedForm, ValidatedJson, ValidatedQuery};
