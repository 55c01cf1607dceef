//! Server-side login records.
//!
//! A session is only authenticated while the login record named by its
//! [`SessionUser::login_token`] exists, belongs to that user and has not
//! expired. Logout deletes the record, so a request that loaded the session
//! before the logout and saves it afterwards can put `auth.user` back into
//! the store but cannot make it valid again.

use sqlx::SqlitePool;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tower_sessions::{session::Error as SessionError, Session};
use tracing::debug;

use crate::sessions::{self, SessionUser};

/// 32 symbols from nanoid's 64-character alphabet.
const LOGIN_TOKEN_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Record a new login for `user_id` and return its token.
pub async fn start_login(
    pool: &SqlitePool,
    user_id: i64,
    ttl: Duration,
) -> Result<String, sqlx::Error> {
    let token = nanoid::nanoid!(LOGIN_TOKEN_LENGTH);
    let now = OffsetDateTime::now_utc().unix_timestamp();

    sqlx::query(
        r#"
        INSERT INTO logins (token, user_id, created_at, expires_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&token)
    .bind(user_id)
    .bind(now)
    .bind(now + ttl.whole_seconds())
    .execute(pool)
    .await?;

    Ok(token)
}

/// Confirm the login is still live and push its expiry forward.
///
/// Check and refresh are one statement, so a concurrent [`end_login`] either
/// happens before (no row matches) or after (the row is gone for every later
/// request).
pub async fn refresh_login(
    pool: &SqlitePool,
    user_id: i64,
    token: &str,
    ttl: Duration,
) -> Result<bool, sqlx::Error> {
    if token.is_empty() {
        return Ok(false);
    }

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let result = sqlx::query(
        r#"
        UPDATE logins
        SET expires_at = ?
        WHERE token = ?
          AND user_id = ?
          AND expires_at > ?
          AND EXISTS (SELECT 1 FROM users WHERE users.id = logins.user_id)
        "#,
    )
    .bind(now + ttl.whole_seconds())
    .bind(token)
    .bind(user_id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn end_login(pool: &SqlitePool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM logins WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

/// Remove login records whose inactivity window has passed. Returns the number deleted.
pub async fn delete_expired_logins(pool: &SqlitePool, now: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM logins WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// The authenticated user of this session, if its login is still live.
///
/// A session user without a live login is removed from the session.
pub async fn resolve_user(
    pool: &SqlitePool,
    session: &Session,
    ttl: Duration,
) -> Result<Option<SessionUser>, LoginError> {
    let Some(user) = sessions::current_user(session).await? else {
        return Ok(None);
    };

    if refresh_login(pool, user.id, &user.login_token, ttl).await? {
        return Ok(Some(user));
    }

    debug!(target: "auth", user_id = user.id, "session user has no live login");
    sessions::clear_user(session).await?;
    Ok(None)
}
