use crate::{config::AppConfig, rate_limit::LoginRateLimiter};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_sessions_sqlx_store::SqliteStore;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Session store, shared with the session layer
    pub session_store: SqliteStore,
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Shared login rate limiter
    pub login_rate_limiter: Arc<LoginRateLimiter>,
}

impl AppState {
    pub fn new(db: SqlitePool, session_store: SqliteStore, config: AppConfig) -> Self {
        Self {
            db,
            session_store,
            config: Arc::new(config),
            login_rate_limiter: Arc::new(LoginRateLimiter::new()),
        }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn session_store(&self) -> &SqliteStore {
        &self.session_store
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn login_rate_limiter(&self) -> &LoginRateLimiter {
        &self.login_rate_limiter
    }

    /// Pepper mixed into every password before hashing, if configured.
    pub fn password_pepper(&self) -> Option<&str> {
        self.config.security.password_pepper.as_deref()
    }
}
