use std::net::SocketAddr;

use snippetbox::{
    build_app, cleanup::spawn_cleanup_job, config::AppConfig, logging::init_logging, StartupError,
};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] snippetbox::config::ConfigError),
    #[error("Startup error: {0}")]
    Startup(#[from] StartupError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("Logging error: {0}")]
    Logging(#[from] snippetbox::logging::LoggingError),
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging first
    init_logging()?;
    info!("Starting Snippetbox");

    let config = AppConfig::load()?;
    info!("Configuration loaded successfully");

    let addr = SocketAddr::new(config.server.bind_addr.parse()?, config.server.port);

    let (state, app) = build_app(config).await?;

    let _cleanup = spawn_cleanup_job(state);

    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
