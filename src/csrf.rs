use serde::Deserialize;
use subtle::ConstantTimeEq;
use tower_sessions::{session::Error as SessionError, Session};

use crate::sessions::SESSION_CSRF_KEY;

/// 64 symbols from a 64-character alphabet, 384 bits of entropy.
const CSRF_TOKEN_LENGTH: usize = 64;

/// Retrieve the CSRF token for the current session or generate a new one.
pub async fn ensure_csrf_token(session: &Session) -> Result<String, SessionError> {
    if let Some(token) = session.get::<String>(SESSION_CSRF_KEY).await? {
        return Ok(token);
    }

    let token = nanoid::nanoid!(CSRF_TOKEN_LENGTH);
    session.insert(SESSION_CSRF_KEY, &token).await?;
    Ok(token)
}

/// Replace the CSRF token for the current session.
pub async fn rotate_csrf_token(session: &Session) -> Result<String, SessionError> {
    let _ = session.remove::<String>(SESSION_CSRF_KEY).await?;
    ensure_csrf_token(session).await
}

/// Validate a provided CSRF token against the session-stored value.
pub async fn validate_csrf_token(session: &Session, provided: &str) -> Result<bool, SessionError> {
    let Some(expected) = session.get::<String>(SESSION_CSRF_KEY).await? else {
        return Ok(false);
    };

    Ok(tokens_match(&expected, provided))
}

/// Exact comparison in constant time. Prefixes and empty tokens never match.
fn tokens_match(expected: &str, provided: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() == 1
}

#[derive(Debug, Default, Deserialize)]
struct CsrfField {
    #[serde(default)]
    csrf_token: Option<String>,
}

/// Pull the token out of an url-encoded form body without touching the other fields.
pub fn token_from_form(body: &[u8]) -> Option<String> {
    serde_urlencoded::from_bytes::<CsrfField>(body)
        .ok()
        .and_then(|field| field.csrf_token)
}
