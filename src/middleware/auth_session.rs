//! Login state kept in the server-side session.
//!
//! [`auth_session_middleware`] restores the logged-in user from the session
//! into a [`CurrentUser`] extension; handlers log users in and out through the
//! [`AuthSession`] extractor and require a user with [`RequireUser`].

use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::middleware::session::Session;

const AUTH_USER_KEY: &str = "auth.user";

/// The identity stored in the session after login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthUser {
    pub id: String,
}

/// The user restored for this request, if any.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthUser>);

pub async fn auth_session_middleware(mut req: Request, next: Next) -> Response {
    let session = req.extensions().get::<Session>().cloned();
    let user = match session {
        Some(session) => session.get::<AuthUser>(AUTH_USER_KEY).await,
        None => {
            tracing::warn!("auth session restore skipped: no session on request");
            None
        }
    };
    req.extensions_mut().insert(CurrentUser(user));
    next.run(req).await
}

pub struct AuthSession {
    session: Session,
    user: Option<AuthUser>,
}

impl AuthSession {
    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Stores the user in the session under a fresh session id.
    pub async fn login(&mut self, user: AuthUser) -> Result<(), AppError> {
        self.session.cycle_id().await;
        self.session
            .insert(AUTH_USER_KEY, &user)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;
        self.user = Some(user);
        Ok(())
    }

    pub async fn logout(&mut self) {
        self.session.remove(AUTH_USER_KEY).await;
        self.user = None;
    }
}

impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        let user = parts.extensions.get::<CurrentUser>().and_then(|c| c.0.clone());
        Ok(AuthSession { session, user })
    }
}

/// Extractor that rejects with 401 unless a user is logged in.
pub struct RequireUser(pub AuthUser);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .and_then(|c| c.0.clone())
            .map(RequireUser)
            .ok_or_else(|| AppError::Unauthorized("Login required".to_string()))
    }
}
