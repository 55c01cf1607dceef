use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::{error, warn};

use crate::{app_state::AppState, csrf, logins, sessions};

use super::{
    constants::{LOGIN_PATH, MAX_FORM_BODY_BYTES},
    utils::{bad_request_response, payload_too_large_response, server_error_response},
};

/// Reject state-changing requests whose `csrf_token` form field doesn't match the session.
///
/// Runs before any handler, so a forged submission never reaches validation
/// or persistence. The buffered body is passed on untouched when the token
/// matches.
pub async fn verify_csrf(session: Session, request: Request, next: Next) -> Response {
    if !is_state_changing(request.method()) {
        return next.run(request).await;
    }

    let declared_len = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > MAX_FORM_BODY_BYTES) {
        warn!(target: "csrf", path = %request.uri().path(), "form body over the size limit");
        return payload_too_large_response();
    }

    let (parts, body) = request.into_parts();
    // Bodies without a declared length are cut off at the same limit while buffering.
    let bytes = match axum::body::to_bytes(body, MAX_FORM_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(target: "csrf", %err, path = %parts.uri.path(), "form body over the size limit");
            return payload_too_large_response();
        }
    };

    let provided = csrf::token_from_form(&bytes).unwrap_or_default();
    match csrf::validate_csrf_token(&session, &provided).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(target: "csrf", path = %parts.uri.path(), "form submitted with invalid CSRF token");
            return bad_request_response();
        }
        Err(err) => {
            error!(target: "csrf", %err, "failed to read CSRF token from session");
            return server_error_response();
        }
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

fn is_state_changing(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
}

/// Gate protected routes behind a signed-in session.
///
/// Anonymous visitors are redirected to the login page; for GET requests the
/// original path is remembered so login can send them back. A session whose
/// login record is gone (logged out, expired, user deleted) is treated as
/// anonymous. The
/// resolved [`sessions::SessionUser`] is made available as a request
/// extension.
pub async fn require_authentication(
    State(state): State<AppState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Response {
    let ttl = state.config().session_idle_timeout();
    let user = match logins::resolve_user(state.db(), &session, ttl).await {
        Ok(user) => user,
        Err(err) => {
            error!(target: "auth", %err, "failed to resolve session user");
            return server_error_response();
        }
    };

    let Some(user) = user else {
        if *request.method() == Method::GET {
            let path = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| request.uri().path().to_string());
            if let Err(err) = sessions::remember_redirect(&session, &path).await {
                error!(target: "sessions", %err, "failed to remember post-login redirect");
            }
        }
        return Redirect::to(LOGIN_PATH).into_response();
    };

    request.extensions_mut().insert(user);

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
