use axum::{http::StatusCode, response::IntoResponse, response::Response};
use tower_sessions::Session;
use tracing::error;

use crate::{
    app_state::AppState,
    templates::{HtmlTemplate, LayoutContext, NotFoundTemplate},
};

/// Build a [`LayoutContext`] from the current session, falling back to a state-only context when
/// the session lookup fails.
pub async fn layout_from_session(
    state: &AppState,
    session: &Session,
    title: &str,
) -> LayoutContext {
    match LayoutContext::from_session(state, session, title).await {
        Ok(layout) => layout,
        Err(err) => {
            error!(target: "templates", %err, "failed to build layout context from session");
            LayoutContext::from_state(state, title)
        }
    }
}

/// The one 404 page, used for unknown routes as well as missing, expired or malformed ids.
pub async fn not_found_response(state: &AppState, session: &Session) -> Response {
    let layout = layout_from_session(state, session, "Not Found").await;
    HtmlTemplate::with_status(NotFoundTemplate::new(layout), StatusCode::NOT_FOUND).into_response()
}
