//! luisbot-web — Axum host for the LUIS turn handler.
//! Loads config, registers recognizers, and serves the messaging endpoint.

mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use luisbot_core::config::Config;
use luisbot_core::handler::TurnHandler;
use luisbot_core::services::BotServices;

use server::AppState;

const DEFAULT_PORT: u16 = 3978;

fn load_config() -> Result<Config> {
    if let Ok(path) = std::env::var("LUISBOT_CONFIG") {
        return Config::load(&PathBuf::from(path));
    }
    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    Config::load_from_dir(&project_root)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = load_config()?;
    let services = Arc::new(BotServices::from_config(&config)?);

    // Fail at startup rather than on the first turn
    TurnHandler::new(Some(Arc::clone(&services)), config.handler.clone())
        .context("Bot setup failed")?;

    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState {
        services,
        settings: config.handler.clone(),
        shutdown: shutdown.clone(),
    });
    let app = server::router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = format!("0.0.0.0:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("LuisBot listening on http://localhost:{}/api/messages", port);

    // Graceful shutdown on Ctrl+C; in-flight turns see the cancellation
    let signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, cancelling turns...");
        shutdown.cancel();
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .context("Server error")?;

    info!("Server stopped.");
    Ok(())
}
