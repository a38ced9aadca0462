use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// The single active relay direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    MaxToTelegram,
    TelegramToMax,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::MaxToTelegram => write!(f, "Max → Telegram"),
            Direction::TelegramToMax => write!(f, "Telegram → Max"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub max: MaxConfig,
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MaxConfig {
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub api_token: String,
    /// Overrides the GREEN-API host derived from the instance id.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Only relay Max messages from this chat.
    #[serde(default)]
    pub chat_filter: Option<String>,
    /// Where Telegram messages land in Max.
    #[serde(default)]
    pub target_chat_id: Option<String>,
}

impl MaxConfig {
    /// Returns the effective GREEN-API base URL: the explicit `api_url` if set,
    /// otherwise the instance host (server id = first 4 chars of the instance id).
    pub fn effective_api_url(&self) -> String {
        if let Some(url) = &self.api_url {
            return url.trim_end_matches('/').to_string();
        }
        let server_id: String = self.instance_id.chars().take(4).collect();
        format!(
            "https://{}.api.green-api.com/v3/waInstance{}",
            server_id, self.instance_id
        )
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Channel (or chat) that receives Max messages.
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Only relay Telegram messages from this chat.
    #[serde(default)]
    pub chat_filter: Option<String>,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` value.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    #[serde(default = "default_enabled")]
    pub max_to_telegram: bool,
    #[serde(default = "default_enabled")]
    pub telegram_to_max: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_to_telegram: default_enabled(),
            telegram_to_max: default_enabled(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Expected bearer token on the GREEN-API webhook.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            webhook_secret: None,
            log_level: default_log_level(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.normalize();
        Ok(config)
    }

    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup (env-style names).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str| {
            get(key)
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or_else(default_enabled)
        };

        let port = match get("WEBHOOK_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Invalid WEBHOOK_PORT: {raw}"))?,
            None => default_port(),
        };

        let mut config = Config {
            max: MaxConfig {
                instance_id: get("MAX_INSTANCE_ID").unwrap_or_default(),
                api_token: get("MAX_API_TOKEN").unwrap_or_default(),
                api_url: get("MAX_API_URL"),
                chat_filter: get("MAX_CHAT_ID"),
                target_chat_id: get("MAX_TARGET_CHAT_ID"),
            },
            telegram: TelegramConfig {
                bot_token: get("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
                channel_id: get("TELEGRAM_CHANNEL_ID"),
                chat_filter: get("TELEGRAM_CHAT_ID"),
                webhook_secret: get("TELEGRAM_WEBHOOK_SECRET"),
            },
            relay: RelayConfig {
                max_to_telegram: flag("ENABLE_MAX_TO_TELEGRAM"),
                telegram_to_max: flag("ENABLE_TELEGRAM_TO_MAX"),
            },
            server: ServerConfig {
                host: get("WEBHOOK_HOST").unwrap_or_else(default_host),
                port,
                webhook_secret: get("WEBHOOK_SECRET"),
                log_level: get("LOG_LEVEL").unwrap_or_else(default_log_level),
            },
        };
        config.normalize();
        Ok(config)
    }

    /// Empty optional values mean "not configured".
    fn normalize(&mut self) {
        for slot in [
            &mut self.max.api_url,
            &mut self.max.chat_filter,
            &mut self.max.target_chat_id,
            &mut self.telegram.channel_id,
            &mut self.telegram.chat_filter,
            &mut self.telegram.webhook_secret,
            &mut self.server.webhook_secret,
        ] {
            if slot.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *slot = None;
            }
        }
    }

    /// Check the startup invariants and return the one active direction.
    pub fn validate(&self) -> Result<Direction> {
        let direction = match (self.relay.max_to_telegram, self.relay.telegram_to_max) {
            (true, true) => anyhow::bail!(
                "Both relay directions are enabled; this would bounce every message back and forth. \
                 Enable exactly one of ENABLE_MAX_TO_TELEGRAM or ENABLE_TELEGRAM_TO_MAX"
            ),
            (false, false) => anyhow::bail!(
                "No relay direction is enabled. \
                 Enable exactly one of ENABLE_MAX_TO_TELEGRAM or ENABLE_TELEGRAM_TO_MAX"
            ),
            (true, false) => Direction::MaxToTelegram,
            (false, true) => Direction::TelegramToMax,
        };

        let mut missing = Vec::new();
        if self.max.instance_id.is_empty() {
            missing.push("MAX_INSTANCE_ID");
        }
        if self.max.api_token.is_empty() {
            missing.push("MAX_API_TOKEN");
        }
        if self.telegram.bot_token.is_empty() {
            missing.push("TELEGRAM_BOT_TOKEN");
        }
        match direction {
            Direction::MaxToTelegram if self.telegram.channel_id.is_none() => {
                missing.push("TELEGRAM_CHANNEL_ID");
            }
            Direction::TelegramToMax if self.max.target_chat_id.is_none() => {
                missing.push("MAX_TARGET_CHAT_ID");
            }
            _ => {}
        }
        if !missing.is_empty() {
            anyhow::bail!("Missing required settings: {}", missing.join(", "));
        }

        Ok(direction)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
