use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use teloxide::types::Update;
use tracing::{debug, error, info, warn};

use crate::config::{Config, Direction};
use crate::format;
use crate::platform::max::GreenApiClient;
use crate::platform::telegram::TelegramClient;
use crate::platform::{SendOutcome, Sender};
use crate::relay::{ChatFilter, MaxToTelegram, RelayStatus, Target, TelegramToMax};

const SERVICE_NAME: &str = "max-telegram-bridge";
const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(30);

// ── Shared state ───────────────────────────────────────────────────────────────

/// Everything a request needs, built once at startup. `None` relays are
/// disabled directions.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    max_relay: Option<Arc<MaxToTelegram>>,
    telegram_relay: Option<Arc<TelegramToMax>>,
    /// Telegram channel used by the `/test` endpoint.
    probe: Option<Target>,
}

impl AppState {
    pub fn new(
        config: Config,
        max_relay: Option<MaxToTelegram>,
        telegram_relay: Option<TelegramToMax>,
        probe: Option<Target>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            max_relay: max_relay.map(Arc::new),
            telegram_relay: telegram_relay.map(Arc::new),
            probe,
        }
    }

    /// Construct the platform clients and the relay for the active direction.
    pub fn from_config(config: Config, direction: Direction) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(OUTBOUND_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        let telegram = Arc::new(TelegramClient::new(
            teloxide::Bot::new(&config.telegram.bot_token),
            http.clone(),
        ));
        let max = Arc::new(GreenApiClient::new(http, &config.max));

        let probe = config
            .telegram
            .channel_id
            .clone()
            .map(|channel| Target::new(telegram.clone(), channel));

        let (max_relay, telegram_relay) = match direction {
            Direction::MaxToTelegram => {
                let target = probe
                    .clone()
                    .context("TELEGRAM_CHANNEL_ID is required for Max → Telegram")?;
                let relay =
                    MaxToTelegram::new(ChatFilter::new(config.max.chat_filter.clone()), target);
                (Some(relay), None)
            }
            Direction::TelegramToMax => {
                let chat = config
                    .max
                    .target_chat_id
                    .clone()
                    .context("MAX_TARGET_CHAT_ID is required for Telegram → Max")?;
                let relay = TelegramToMax::new(
                    ChatFilter::new(config.telegram.chat_filter.clone()),
                    Target::new(max, chat),
                    telegram,
                );
                (None, Some(relay))
            }
        };

        Ok(Self::new(config, max_relay, telegram_relay, probe))
    }
}

// ── Errors ─────────────────────────────────────────────────────────────────────

/// Any handler fault. Rendered as a generic 500 so the webhook sender always
/// gets a well-formed body.
pub struct AppError(anyhow::Error);

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Error processing request: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "message": format!("{:#}", self.0) })),
        )
            .into_response()
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "status": "unauthorized", "message": "Unauthorized" })),
    )
        .into_response()
}

fn relay_response(status: RelayStatus) -> Response {
    (StatusCode::OK, Json(status)).into_response()
}

// ── Authentication ─────────────────────────────────────────────────────────────

fn bearer_matches(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(secret) = expected else {
        return true;
    };
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == secret)
}

fn secret_header_matches(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(secret) = expected else {
        return true;
    };
    headers
        .get(TELEGRAM_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|provided| provided == secret)
}

// ── Handlers ───────────────────────────────────────────────────────────────────

async fn root() -> Json<Value> {
    Json(json!({
        "status": "running",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let config = &state.config;
    let max_to_telegram = state.max_relay.is_some();
    let telegram_to_max = state.telegram_relay.is_some();
    Json(json!({
        "status": "healthy",
        "telegram_configured": !config.telegram.bot_token.is_empty(),
        "max_configured": !config.max.instance_id.is_empty() && !config.max.api_token.is_empty(),
        "directions": {
            "max_to_telegram": max_to_telegram,
            "telegram_to_max": telegram_to_max,
        },
        "max_to_telegram": {
            "enabled": max_to_telegram,
            "channel_id": config.telegram.channel_id.as_ref().filter(|_| max_to_telegram),
            "chat_filter": config.max.chat_filter.as_deref().unwrap_or("all"),
        },
        "telegram_to_max": {
            "enabled": telegram_to_max,
            "chat_filter": config.telegram.chat_filter.as_deref().unwrap_or("all"),
            "target_chat": config.max.target_chat_id.as_ref().filter(|_| telegram_to_max),
        },
    }))
}

/// GREEN-API webhook (Max → Telegram).
async fn max_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let Some(relay) = &state.max_relay else {
        warn!("Received Max webhook but Max → Telegram is disabled");
        return Ok(relay_response(RelayStatus::Disabled {
            message: "Max → Telegram direction is disabled".to_string(),
        }));
    };

    if !bearer_matches(&headers, state.config.server.webhook_secret.as_deref()) {
        warn!("Unauthorized Max webhook request");
        return Ok(unauthorized());
    }

    let payload: Value =
        serde_json::from_slice(&body).context("Invalid GREEN-API webhook payload")?;
    let status = relay.handle_payload(&payload).await?;
    Ok(relay_response(status))
}

/// Telegram Bot API webhook (Telegram → Max).
async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let Some(relay) = &state.telegram_relay else {
        warn!("Received Telegram webhook but Telegram → Max is disabled");
        return Ok(relay_response(RelayStatus::Disabled {
            message: "Telegram → Max direction is disabled".to_string(),
        }));
    };

    if !secret_header_matches(&headers, state.config.telegram.webhook_secret.as_deref()) {
        warn!("Unauthorized Telegram webhook request");
        return Ok(unauthorized());
    }

    let update: Update = serde_json::from_slice(&body).context("Invalid Telegram update")?;
    debug!("Received Telegram update {}", update.id.0);
    let status = relay.handle(&update).await?;
    Ok(relay_response(status))
}

#[derive(Debug, Deserialize, Default)]
struct TestRequest {
    text: Option<String>,
    sender_name: Option<String>,
}

/// Manual diagnostic send to the Telegram channel.
async fn test_send(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, AppError> {
    let request: TestRequest = if body.is_empty() {
        TestRequest::default()
    } else {
        serde_json::from_slice(&body).context("Invalid test request")?
    };
    let target = state
        .probe
        .as_ref()
        .context("TELEGRAM_CHANNEL_ID is not configured")?;

    let text = request
        .text
        .unwrap_or_else(|| "Test message from Max bridge".to_string());
    let sender = Sender::new(
        Some(
            request
                .sender_name
                .unwrap_or_else(|| "Test User".to_string()),
        ),
        None,
    );

    let body = format::for_telegram(&text, &sender);
    match target.outbound.send_text(&target.chat_id, &body).await {
        SendOutcome::Sent { .. } => Ok(Json(json!({
            "status": "success",
            "message": "Test message sent to Telegram",
        }))),
        SendOutcome::Failed { reason } => Err(anyhow::anyhow!("Test send failed: {reason}").into()),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/webhook", post(max_webhook))
        .route("/telegram/webhook", post(telegram_webhook))
        .route("/test", post(test_send))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> Result<()> {
    info!(
        "Listening on {}",
        listener
            .local_addr()
            .context("Listener has no local address")?
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .context("Server error")
}

// ── Tests ──────────────────────────────────────────────────────────────────────
