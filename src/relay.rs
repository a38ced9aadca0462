//! Per-direction receivers: relevance checks, classification, attribution and
//! dispatch of one webhook event.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use teloxide::types::{Update, UpdateKind};
use tracing::{debug, info, warn};

use crate::format;
use crate::platform::{
    max, preview, telegram, Attachment, FileLocator, IncomingMessage, MessageContent, Outbound,
    OutboundFile, SendOutcome,
};

/// Terminal status of one relay attempt, serialized as the webhook response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RelayStatus {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    Ignored {
        reason: IgnoreReason,
    },
    Unsupported {
        #[serde(rename = "type")]
        kind: String,
    },
    Failed {
        message: String,
    },
    Disabled {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    NotAMessage,
    ChatFilter,
    EmptyMessage,
    MissingContent,
    Command,
}

impl From<SendOutcome> for RelayStatus {
    fn from(outcome: SendOutcome) -> Self {
        match outcome {
            SendOutcome::Sent { message_id } => RelayStatus::Success { message_id },
            SendOutcome::Failed { reason } => RelayStatus::Failed { message: reason },
        }
    }
}

/// Optional allow-list of one source chat. `None` accepts every chat.
#[derive(Debug, Clone, Default)]
pub struct ChatFilter(Option<String>);

impl ChatFilter {
    pub fn new(chat_id: Option<String>) -> Self {
        Self(chat_id.filter(|c| !c.trim().is_empty()))
    }

    pub fn accepts(&self, chat_id: Option<&str>) -> bool {
        match &self.0 {
            None => true,
            Some(expected) => chat_id == Some(expected.as_str()),
        }
    }

    pub fn describe(&self) -> &str {
        self.0.as_deref().unwrap_or("all")
    }
}

/// A destination client plus the chat it writes to.
#[derive(Clone)]
pub struct Target {
    pub outbound: Arc<dyn Outbound>,
    pub chat_id: String,
}

impl Target {
    pub fn new(outbound: Arc<dyn Outbound>, chat_id: impl Into<String>) -> Self {
        Self {
            outbound,
            chat_id: chat_id.into(),
        }
    }
}

// ── Max → Telegram ─────────────────────────────────────────────────────────────

pub struct MaxToTelegram {
    filter: ChatFilter,
    target: Target,
}

impl MaxToTelegram {
    pub fn new(filter: ChatFilter, target: Target) -> Self {
        info!(
            "Max → Telegram relay ready. Chat filter: {}, Telegram chat: {}",
            filter.describe(),
            target.chat_id
        );
        Self { filter, target }
    }

    /// Relay a raw GREEN-API body. Non-message notifications are answered
    /// from `typeWebhook` alone, whatever the rest of their shape.
    pub async fn handle_payload(&self, payload: &Value) -> Result<RelayStatus> {
        let type_webhook = max::webhook_type(payload);
        if !type_webhook.is_some_and(max::is_message_type) {
            debug!("Ignoring webhook type: {:?}", type_webhook);
            return Ok(RelayStatus::Ignored {
                reason: IgnoreReason::NotAMessage,
            });
        }
        let webhook =
            max::MaxWebhook::deserialize(payload).context("Invalid GREEN-API webhook payload")?;
        self.handle(&webhook).await
    }

    pub async fn handle(&self, webhook: &max::MaxWebhook) -> Result<RelayStatus> {
        info!(
            "Received Max webhook type: {} (id: {})",
            webhook.type_webhook,
            webhook.id_message.as_deref().unwrap_or("-")
        );

        if !webhook.is_message_event() {
            debug!("Ignoring webhook type: {}", webhook.type_webhook);
            return Ok(RelayStatus::Ignored {
                reason: IgnoreReason::NotAMessage,
            });
        }
        if webhook.is_outgoing() {
            debug!("Outgoing webhook payload: {:?}", webhook);
        }

        let message = max::classify(webhook);
        if !self.filter.accepts(message.chat_id.as_deref()) {
            info!(
                "Skipping Max message from chat {:?} (not target chat)",
                message.chat_id
            );
            return Ok(RelayStatus::Ignored {
                reason: IgnoreReason::ChatFilter,
            });
        }

        Ok(self.relay(message).await)
    }

    async fn relay(&self, message: IncomingMessage) -> RelayStatus {
        let IncomingMessage { sender, content, .. } = message;
        match content {
            MessageContent::Text(text) => {
                if text.is_empty() {
                    return RelayStatus::Ignored {
                        reason: IgnoreReason::EmptyMessage,
                    };
                }
                let body = format::for_telegram(&text, &sender);
                self.target
                    .outbound
                    .send_text(&self.target.chat_id, &body)
                    .await
                    .into()
            }
            MessageContent::File(attachment) => {
                if attachment.source.is_empty() {
                    warn!("Max {} message without a download URL", attachment.kind);
                    return RelayStatus::Ignored {
                        reason: IgnoreReason::MissingContent,
                    };
                }
                let file = outbound_file(&attachment, attachment.source.clone(), |caption| {
                    format::for_telegram(caption, &sender)
                });
                self.target
                    .outbound
                    .send_file(&self.target.chat_id, &file)
                    .await
                    .into()
            }
            MessageContent::Unsupported(kind) => {
                warn!("Unsupported Max message type: {}", kind);
                RelayStatus::Unsupported { kind }
            }
        }
    }
}

// ── Telegram → Max ─────────────────────────────────────────────────────────────

pub struct TelegramToMax {
    filter: ChatFilter,
    target: Target,
    files: Arc<dyn FileLocator>,
}

impl TelegramToMax {
    pub fn new(filter: ChatFilter, target: Target, files: Arc<dyn FileLocator>) -> Self {
        info!(
            "Telegram → Max relay ready. Chat filter: {}, Max chat: {}",
            filter.describe(),
            target.chat_id
        );
        Self {
            filter,
            target,
            files,
        }
    }

    pub async fn handle(&self, update: &Update) -> Result<RelayStatus> {
        let UpdateKind::Message(msg) = &update.kind else {
            debug!("Ignoring Telegram update {} without a message", update.id.0);
            return Ok(RelayStatus::Ignored {
                reason: IgnoreReason::NotAMessage,
            });
        };

        let message = telegram::classify(msg);
        if !self.filter.accepts(message.chat_id.as_deref()) {
            debug!("Skipping Telegram message from chat {:?}", message.chat_id);
            return Ok(RelayStatus::Ignored {
                reason: IgnoreReason::ChatFilter,
            });
        }

        self.relay(message).await
    }

    async fn relay(&self, message: IncomingMessage) -> Result<RelayStatus> {
        let IncomingMessage { sender, content, .. } = message;
        let status: RelayStatus = match content {
            MessageContent::Text(text) => {
                if text.is_empty() {
                    return Ok(RelayStatus::Ignored {
                        reason: IgnoreReason::EmptyMessage,
                    });
                }
                if text.starts_with('/') {
                    debug!("Not relaying Telegram command: {}", preview(&text, 50));
                    return Ok(RelayStatus::Ignored {
                        reason: IgnoreReason::Command,
                    });
                }
                info!("Processing text message from Telegram: {}", preview(&text, 50));
                let body = format::for_max(&text, &sender);
                self.target
                    .outbound
                    .send_text(&self.target.chat_id, &body)
                    .await
                    .into()
            }
            MessageContent::File(attachment) => {
                info!(
                    "Processing {} from Telegram: {}",
                    attachment.kind, attachment.filename
                );
                let url = self.files.file_url(&attachment.source).await?;
                let file = outbound_file(&attachment, url, |caption| {
                    format::for_max(caption, &sender)
                });
                self.target
                    .outbound
                    .send_file(&self.target.chat_id, &file)
                    .await
                    .into()
            }
            MessageContent::Unsupported(kind) => {
                warn!("Unsupported Telegram message type: {}", kind);
                RelayStatus::Unsupported { kind }
            }
        };
        Ok(status)
    }
}

/// Default the caption per kind, then apply sender attribution to it.
fn outbound_file<F>(attachment: &Attachment, url: String, attribute: F) -> OutboundFile
where
    F: FnOnce(&str) -> String,
{
    let caption = format::caption_or_default(
        attachment.kind,
        attachment.caption.as_deref(),
        &attachment.filename,
    );
    OutboundFile {
        kind: attachment.kind.into(),
        url,
        filename: attachment.filename.clone(),
        caption: attribute(&caption),
    }
}
