//! Typed access to the per-visitor session record.
//!
//! The record itself lives in the SQLite-backed `tower-sessions` store and is
//! loaded once per request by the session layer. Everything the application
//! keeps there goes through the helpers below so the keys stay in one place.

use serde::{Deserialize, Serialize};
use tower_sessions::{
    cookie::SameSite, session::Error as SessionError, Expiry, Session, SessionManagerLayer,
};
use tower_sessions_sqlx_store::SqliteStore;

use crate::config::AppConfig;

pub const SESSION_USER_KEY: &str = "auth.user";
pub const SESSION_CSRF_KEY: &str = "security.csrf";
pub const SESSION_FLASH_KEY: &str = "ui.flash";
pub const SESSION_REDIRECT_KEY: &str = "auth.redirect_after_login";

/// Cookie and expiry policy for the session layer.
pub fn session_layer(store: SqliteStore, config: &AppConfig) -> SessionManagerLayer<SqliteStore> {
    SessionManagerLayer::new(store)
        .with_name(config.session.cookie_name.clone())
        .with_secure(config.security.cookie_secure)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_path("/")
        .with_expiry(Expiry::OnInactivity(config.session_idle_timeout()))
}

/// The signed-in user as remembered by the session.
///
/// `login_token` names the server-side login record; the session only counts
/// as authenticated while that record exists (see [`crate::logins`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionUser {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub login_token: String,
}

impl SessionUser {
    pub fn new(id: i64, name: String, login_token: String) -> Self {
        Self {
            id,
            name,
            login_token,
        }
    }
}

pub async fn store_user(session: &Session, user: &SessionUser) -> Result<(), SessionError> {
    session.insert(SESSION_USER_KEY, user).await
}

pub async fn clear_user(session: &Session) -> Result<(), SessionError> {
    let _ = session.remove::<SessionUser>(SESSION_USER_KEY).await?;
    Ok(())
}

pub async fn current_user(session: &Session) -> Result<Option<SessionUser>, SessionError> {
    session.get(SESSION_USER_KEY).await
}

/// Issue a new session identifier while keeping the stored data.
///
/// Called whenever the authentication state changes so a token captured
/// before login can never be replayed afterwards.
pub async fn rotate_session(session: &Session) -> Result<(), SessionError> {
    session.cycle_id().await
}

/// Queue a message for the next rendered page.
pub async fn put_flash(session: &Session, message: impl Into<String>) -> Result<(), SessionError> {
    session.insert(SESSION_FLASH_KEY, message.into()).await
}

/// Take the pending flash message, if any. A message is only ever returned once.
pub async fn take_flash(session: &Session) -> Result<Option<String>, SessionError> {
    session.remove::<String>(SESSION_FLASH_KEY).await
}

pub async fn remember_redirect(session: &Session, path: &str) -> Result<(), SessionError> {
    session.insert(SESSION_REDIRECT_KEY, path).await
}

/// Take the path remembered by the authentication guard, if it is still a local path.
pub async fn take_redirect(session: &Session) -> Result<Option<String>, SessionError> {
    let path = session.remove::<String>(SESSION_REDIRECT_KEY).await?;
    Ok(path.filter(|path| is_local_path(path)))
}

/// Only same-origin absolute paths are acceptable redirect targets.
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}
