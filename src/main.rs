mod config;
mod download;
mod format;
mod platform;
mod relay;
mod server;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Direction};
use crate::server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration: a TOML file when given, the environment otherwise
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::from_env().context("Failed to load config from environment")?,
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.to_lowercase().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Max ⇄ Telegram bridge");
    let enabled = |on: bool| if on { "ENABLED" } else { "DISABLED" };
    info!("  Max → Telegram: {}", enabled(config.relay.max_to_telegram));
    info!("  Telegram → Max: {}", enabled(config.relay.telegram_to_max));

    let direction = match config.validate() {
        Ok(direction) => direction,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return Err(e);
        }
    };

    match direction {
        Direction::MaxToTelegram => {
            info!(
                "  Telegram channel: {}",
                config.telegram.channel_id.as_deref().unwrap_or_default()
            );
            info!(
                "  Max chat filter: {}",
                config.max.chat_filter.as_deref().unwrap_or("ALL CHATS")
            );
        }
        Direction::TelegramToMax => {
            info!(
                "  Telegram chat filter: {}",
                config.telegram.chat_filter.as_deref().unwrap_or("ALL CHATS")
            );
            info!(
                "  Max target chat: {}",
                config.max.target_chat_id.as_deref().unwrap_or_default()
            );
        }
    }

    let addr = config.bind_addr();
    let state = AppState::from_config(config, direction)?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Relay {} is running", direction);
    server::serve(listener, state).await?;

    info!("Application stopped");
    Ok(())
}
