use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;
use tracing::error;

use crate::{
    app_state::AppState,
    snippets,
    templates::{HomeTemplate, HtmlTemplate, SnippetRow},
};

use super::shared::{layout_from_session, not_found_response};
use crate::server::{constants::LATEST_SNIPPETS_LIMIT, utils::server_error_response};

/// Render the home page with the latest snippets.
pub async fn home_handler(State(state): State<AppState>, session: Session) -> Response {
    let latest = match snippets::latest_snippets(state.db(), LATEST_SNIPPETS_LIMIT).await {
        Ok(records) => records,
        Err(err) => {
            error!(target: "snippets", %err, "failed to load latest snippets");
            return server_error_response();
        }
    };

    let rows = latest.into_iter().map(SnippetRow::from).collect();
    let layout = layout_from_session(&state, &session, "Home").await;

    HtmlTemplate::new(HomeTemplate::new(layout, rows)).into_response()
}

/// Liveness probe. Touches neither the database nor the session.
pub async fn ping_handler() -> &'static str {
    "OK"
}

pub async fn fallback_handler(State(state): State<AppState>, session: Session) -> Response {
    not_found_response(&state, &session).await
}
