pub mod app_state;
pub mod auth;
pub mod cleanup;
pub mod config;
pub mod csrf;
pub mod database;
pub mod logging;
pub mod logins;
pub mod rate_limit;
pub mod server;
pub mod sessions;
pub mod snippets;
pub mod templates;
pub mod users;
pub mod validator;

use axum::Router;
use thiserror::Error;
use tower_sessions_sqlx_store::SqliteStore;
use tracing::info;

use app_state::AppState;
use config::AppConfig;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database initialization error: {0}")]
    Database(#[from] database::DatabaseError),
    #[error("Session store error: {0}")]
    SessionStore(#[from] sqlx::Error),
}

/// Open the database, prepare the session store and assemble the router.
///
/// The binary and the integration tests both go through here so they run the
/// exact same middleware stack.
pub async fn build_app(config: AppConfig) -> Result<(AppState, Router), StartupError> {
    let db_pool = database::initialize_database(&config).await?;

    let session_store = SqliteStore::new(db_pool.clone());
    session_store.migrate().await?;
    info!("Session store ready");

    let session_layer = sessions::session_layer(session_store.clone(), &config);
    let state = AppState::new(db_pool, session_store, config);
    let router = server::router::build_router(state.clone(), session_layer);

    Ok((state, router))
}
