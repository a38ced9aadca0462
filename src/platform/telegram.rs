use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::payloads::{
    SendDocumentSetters, SendMessageSetters, SendPhotoSetters, SendVideoSetters,
};
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, ParseMode, Recipient};
use tracing::{error, info};

use crate::download::with_temp_download;
use crate::platform::{
    preview, redact_url, Attachment, FileKind, FileLocator, IncomingMessage, MessageContent,
    MessageKind, Outbound, OutboundFile, SendOutcome, Sender,
};

/// Normalize a Telegram message. Photos relay the largest available size.
pub fn classify(msg: &Message) -> IncomingMessage {
    let sender = match msg.from.as_ref() {
        Some(user) => Sender::new(Some(user.full_name()), user.username.clone()),
        None => Sender::default(),
    };

    let file = |kind: MessageKind, file_id: &FileId, filename: &str| {
        MessageContent::File(Attachment {
            kind,
            source: file_id.0.clone(),
            filename: filename.to_string(),
            caption: msg.caption().map(str::to_string),
        })
    };

    let content = if let Some(text) = msg.text() {
        MessageContent::Text(text.to_string())
    } else if let Some(largest) = msg.photo().and_then(|sizes| sizes.last()) {
        file(MessageKind::Photo, &largest.file.id, "photo.jpg")
    } else if let Some(video) = msg.video() {
        let name = video.file_name.as_deref().unwrap_or("video.mp4");
        file(MessageKind::Video, &video.file.id, name)
    } else if let Some(document) = msg.document() {
        let name = document.file_name.as_deref().unwrap_or("document");
        file(MessageKind::Document, &document.file.id, name)
    } else if let Some(voice) = msg.voice() {
        file(MessageKind::Voice, &voice.file.id, "voice.ogg")
    } else if let Some(audio) = msg.audio() {
        let name = audio.file_name.as_deref().unwrap_or("audio.mp3");
        file(MessageKind::Audio, &audio.file.id, name)
    } else {
        MessageContent::Unsupported(unsupported_label(msg))
    };

    IncomingMessage {
        chat_id: Some(msg.chat.id.0.to_string()),
        sender,
        content,
    }
}

fn unsupported_label(msg: &Message) -> String {
    if msg.sticker().is_some() {
        "sticker".to_string()
    } else if msg.animation().is_some() {
        "animation".to_string()
    } else if msg.location().is_some() {
        "location".to_string()
    } else if msg.contact().is_some() {
        "contact".to_string()
    } else if msg.poll().is_some() {
        "poll".to_string()
    } else {
        "unknown".to_string()
    }
}

/// Numeric ids address chats directly; anything else is a `@channel` username.
pub fn parse_recipient(chat_id: &str) -> Recipient {
    match chat_id.trim().parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(chat_id.trim().to_string()),
    }
}

/// Telegram side of the relay: HTML-formatted sends, files re-uploaded from a
/// local temporary copy.
pub struct TelegramClient {
    bot: Bot,
    http: reqwest::Client,
}

impl TelegramClient {
    pub fn new(bot: Bot, http: reqwest::Client) -> Self {
        Self { bot, http }
    }

    async fn upload(
        &self,
        chat: Recipient,
        path: PathBuf,
        file: &OutboundFile,
    ) -> Result<Message> {
        let input = InputFile::file(path).file_name(file.filename.clone());
        let sent = match file.kind {
            FileKind::Photo => {
                self.bot
                    .send_photo(chat, input)
                    .caption(file.caption.clone())
                    .parse_mode(ParseMode::Html)
                    .await
            }
            FileKind::Video => {
                self.bot
                    .send_video(chat, input)
                    .caption(file.caption.clone())
                    .parse_mode(ParseMode::Html)
                    .await
            }
            FileKind::Document => {
                self.bot
                    .send_document(chat, input)
                    .caption(file.caption.clone())
                    .parse_mode(ParseMode::Html)
                    .await
            }
        };
        sent.with_context(|| format!("Telegram rejected {}", file.filename))
    }
}

#[async_trait]
impl Outbound for TelegramClient {
    async fn send_text(&self, chat_id: &str, text: &str) -> SendOutcome {
        let result = self
            .bot
            .send_message(parse_recipient(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await;
        match result {
            Ok(sent) => {
                info!(
                    "Text message sent to Telegram chat {}: {}",
                    chat_id,
                    preview(text, 50)
                );
                SendOutcome::Sent {
                    message_id: Some(sent.id.0.to_string()),
                }
            }
            Err(e) => {
                error!(
                    "Failed to send text to Telegram chat {} ({}): {}",
                    chat_id,
                    preview(text, 50),
                    e
                );
                SendOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn send_file(&self, chat_id: &str, file: &OutboundFile) -> SendOutcome {
        let chat = parse_recipient(chat_id);
        let result = with_temp_download(&self.http, &file.url, |path: &Path| {
            self.upload(chat, path.to_path_buf(), file)
        })
        .await;
        match result {
            Ok(sent) => {
                info!(
                    "File sent to Telegram chat {}: {} ({})",
                    chat_id,
                    file.filename,
                    preview(&redact_url(&file.url), 50)
                );
                SendOutcome::Sent {
                    message_id: Some(sent.id.0.to_string()),
                }
            }
            Err(e) => {
                error!(
                    "Failed to send file {} to Telegram chat {} ({}): {:#}",
                    file.filename,
                    chat_id,
                    preview(&redact_url(&file.url), 50),
                    e
                );
                SendOutcome::Failed {
                    reason: format!("{e:#}"),
                }
            }
        }
    }
}

#[async_trait]
impl FileLocator for TelegramClient {
    async fn file_url(&self, file_id: &str) -> Result<String> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .with_context(|| format!("Failed to resolve Telegram file {file_id}"))?;
        let api_url = self.bot.api_url();
        Ok(format!(
            "{}/file/bot{}/{}",
            api_url.as_str().trim_end_matches('/'),
            self.bot.token(),
            file.path
        ))
    }
}
