use config::{Config, ConfigError as BaseConfigError, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct SecurityConfig {
    pub cookie_secure: bool,
    pub password_pepper: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub idle_timeout_minutes: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct UiConfig {
    pub brand_name: String,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub session: SessionConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(#[from] BaseConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Upper bound for the session inactivity timeout (30 days).
pub const MAX_IDLE_TIMEOUT_MINUTES: u64 = 43_200;
/// Upper bound for waiting on a pooled database connection.
const MAX_ACQUIRE_TIMEOUT_SECS: u64 = 60;

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let defaults = AppConfig::default();
        let mut settings = Config::builder();

        settings = settings.add_source(config::Config::try_from(&defaults)?);

        // Add config file if it exists
        settings = settings.add_source(File::with_name("config").required(false));

        settings = settings
            // Server settings
            .set_override(
                "server.bind_addr",
                std::env::var("SERVER_BIND_ADDR").unwrap_or(defaults.server.bind_addr),
            )?
            .set_override(
                "server.port",
                env_or("SERVER_PORT", defaults.server.port),
            )?
            // Database settings
            .set_override(
                "database.url",
                std::env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            )?
            .set_override(
                "database.max_connections",
                env_or("DATABASE_MAX_CONNECTIONS", defaults.database.max_connections),
            )?
            .set_override(
                "database.acquire_timeout_secs",
                env_or(
                    "DATABASE_ACQUIRE_TIMEOUT_SECS",
                    defaults.database.acquire_timeout_secs,
                ),
            )?
            // Security settings
            .set_override(
                "security.cookie_secure",
                env_or("COOKIE_SECURE", defaults.security.cookie_secure),
            )?
            .set_override(
                "security.password_pepper",
                std::env::var("PASSWORD_PEPPER").ok(),
            )?
            // Session settings
            .set_override(
                "session.cookie_name",
                std::env::var("SESSION_COOKIE_NAME").unwrap_or(defaults.session.cookie_name),
            )?
            .set_override(
                "session.idle_timeout_minutes",
                env_or(
                    "SESSION_IDLE_TIMEOUT_MINUTES",
                    defaults.session.idle_timeout_minutes,
                ),
            )?
            // UI settings
            .set_override(
                "ui.brand_name",
                std::env::var("UI_BRAND_NAME").unwrap_or(defaults.ui.brand_name),
            )?;

        let settings = settings.build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "DATABASE_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        if !(1..=MAX_ACQUIRE_TIMEOUT_SECS).contains(&self.database.acquire_timeout_secs) {
            return Err(ConfigError::Validation(format!(
                "DATABASE_ACQUIRE_TIMEOUT_SECS must be between 1 and {MAX_ACQUIRE_TIMEOUT_SECS}"
            )));
        }

        if !(1..=MAX_IDLE_TIMEOUT_MINUTES).contains(&self.session.idle_timeout_minutes) {
            return Err(ConfigError::Validation(format!(
                "SESSION_IDLE_TIMEOUT_MINUTES must be between 1 and {MAX_IDLE_TIMEOUT_MINUTES} (30 days)"
            )));
        }

        if self.session.cookie_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "SESSION_COOKIE_NAME cannot be empty".to_string(),
            ));
        }

        if self.ui.brand_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "UI_BRAND_NAME cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Inactivity window shared by the session cookie and the server-side login record.
    pub fn session_idle_timeout(&self) -> time::Duration {
        let minutes = self.session.idle_timeout_minutes.min(MAX_IDLE_TIMEOUT_MINUTES);
        time::Duration::minutes(minutes as i64)
    }
}

/// Read an environment variable and parse it, falling back to `default` when unset or invalid.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0".to_string(),
                port: 4000,
            },
            database: DatabaseConfig {
                url: "sqlite://data/snippetbox.db?mode=rwc".to_string(),
                max_connections: 10,
                acquire_timeout_secs: 5,
            },
            security: SecurityConfig {
                cookie_secure: false,
                password_pepper: None,
            },
            session: SessionConfig {
                cookie_name: "snippetbox_session".to_string(),
                idle_timeout_minutes: 12 * 60,
            },
            ui: UiConfig {
                brand_name: "Snippetbox".to_string(),
            },
        }
    }
}
