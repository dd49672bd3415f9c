//! Cookie-backed server-side sessions.
//!
//! The cookie only carries a signed session id; data lives in a [`SessionStore`].
//! Sessions are persisted only when a handler modified them, and a cookie is
//! only issued once a new session has something in it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha512};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::Secret;
use crate::error::AppError;

pub const SESSION_COOKIE: &str = "sid";
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

type SessionData = HashMap<String, Value>;

struct StoredSession {
    data: SessionData,
    expires_at: Instant,
}

/// In-memory session storage shared by all requests.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, StoredSession>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: Arc::new(RwLock::new(HashMap::new())), ttl }
    }

    /// Returns the session data and pushes its expiry forward.
    async fn load(&self, id: Uuid) -> Option<SessionData> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        match sessions.get_mut(&id) {
            Some(s) if s.expires_at > now => {
                s.expires_at = now + self.ttl;
                Some(s.data.clone())
            }
            Some(_) => {
                sessions.remove(&id);
                None
            }
            None => None,
        }
    }

    async fn save(&self, id: Uuid, data: SessionData) {
        let expires_at = Instant::now() + self.ttl;
        self.sessions.write().await.insert(id, StoredSession { data, expires_at });
    }

    async fn remove(&self, id: Uuid) {
        self.sessions.write().await.remove(&id);
    }

    /// Drops expired sessions and returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SESSION_TTL)
    }
}

/// State for [`session_middleware`]: the store plus the cookie signing key.
#[derive(Clone)]
pub struct SessionManager {
    store: SessionStore,
    key: Key,
}

impl SessionManager {
    /// The signing key is derived from the configured secret, so any secret length works.
    pub fn new(secret: &Secret, store: SessionStore) -> Self {
        let digest = Sha512::digest(secret.expose().as_bytes());
        Self { store, key: Key::from(digest.as_slice()) }
    }
}

impl FromRef<SessionManager> for Key {
    fn from_ref(manager: &SessionManager) -> Self {
        manager.key.clone()
    }
}

#[derive(Default)]
struct SessionInner {
    id: Option<Uuid>,
    data: SessionData,
    modified: bool,
    destroyed: bool,
    rotated_from: Option<Uuid>,
}

/// Handle to the current request's session, available as an extractor.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

enum Commit {
    Unchanged,
    Save { id: Uuid, data: SessionData, issue_cookie: bool, stale: Option<Uuid> },
    Destroy(Option<Uuid>),
}

impl Session {
    fn fresh() -> Self {
        Self { inner: Arc::new(Mutex::new(SessionInner::default())) }
    }

    fn loaded(id: Uuid, data: SessionData) -> Self {
        Self { inner: Arc::new(Mutex::new(SessionInner { id: Some(id), data, ..Default::default() })) }
    }

    pub async fn id(&self) -> Option<Uuid> {
        self.inner.lock().await.id
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let inner = self.inner.lock().await;
        inner.data.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub async fn insert<T: Serialize>(&self, key: &str, value: T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        let mut inner = self.inner.lock().await;
        inner.data.insert(key.to_string(), value);
        inner.modified = true;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock().await;
        let removed = inner.data.remove(key);
        if removed.is_some() {
            inner.modified = true;
        }
        removed
    }

    /// Issues a new id for the session, keeping its data. Used on privilege changes.
    pub async fn cycle_id(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(old) = inner.id.take() {
            inner.rotated_from = Some(old);
        }
        inner.modified = true;
    }

    /// Deletes the session from the store and clears the cookie.
    pub async fn destroy(&self) {
        let mut inner = self.inner.lock().await;
        inner.data.clear();
        inner.destroyed = true;
    }

    async fn commit(&self) -> Commit {
        let mut inner = self.inner.lock().await;
        if inner.destroyed {
            return Commit::Destroy(inner.id.or(inner.rotated_from));
        }
        if !inner.modified {
            return Commit::Unchanged;
        }
        let (id, issue_cookie) = match inner.id {
            Some(id) => (id, false),
            None => {
                let id = Uuid::new_v4();
                inner.id = Some(id);
                (id, true)
            }
        };
        Commit::Save { id, data: inner.data.clone(), issue_cookie, stale: inner.rotated_from.take() }
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("session middleware is not installed")))
    }
}

fn session_cookie(id: Uuid) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Loads the session named by the signed `sid` cookie and persists it after the handler ran.
pub async fn session_middleware(
    State(manager): State<SessionManager>,
    jar: SignedCookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let cookie_id = jar.get(SESSION_COOKIE).and_then(|c| Uuid::parse_str(c.value()).ok());
    let session = match cookie_id {
        Some(id) => match manager.store.load(id).await {
            Some(data) => Session::loaded(id, data),
            None => Session::fresh(),
        },
        None => Session::fresh(),
    };

    req.extensions_mut().insert(session.clone());
    let res = next.run(req).await;

    match session.commit().await {
        Commit::Unchanged => res,
        Commit::Save { id, data, issue_cookie, stale } => {
            if let Some(old) = stale {
                manager.store.remove(old).await;
            }
            manager.store.save(id, data).await;
            if issue_cookie {
                (jar.add(session_cookie(id)), res).into_response()
            } else {
                res
            }
        }
        Commit::Destroy(id) => {
            if let Some(id) = id {
                manager.store.remove(id).await;
            }
            let removal = Cookie::build(SESSION_COOKIE).path("/").build();
            (jar.remove(removal), res).into_response()
        }
    }
}
