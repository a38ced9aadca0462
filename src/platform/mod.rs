pub mod max;
pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// File-bearing message kinds the relay understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Photo,
    Video,
    Document,
    Audio,
    Voice,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Photo => write!(f, "photo"),
            MessageKind::Video => write!(f, "video"),
            MessageKind::Document => write!(f, "document"),
            MessageKind::Audio => write!(f, "audio"),
            MessageKind::Voice => write!(f, "voice"),
        }
    }
}

/// Who wrote the message on the source platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    pub name: Option<String>,
    /// Username on Telegram, phone number on Max.
    pub handle: Option<String>,
}

impl Sender {
    pub fn new(name: Option<String>, handle: Option<String>) -> Self {
        let clean = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            name: clean(name),
            handle: clean(handle),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_none() && self.handle.is_none()
    }
}

/// A file carried by an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: MessageKind,
    /// A downloadable URL (Max) or a bot API file id (Telegram).
    pub source: String,
    pub filename: String,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    File(Attachment),
    /// Recognized event with a message type the relay does not map.
    Unsupported(String),
}

/// A webhook event after parsing, independent of the originating wire shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Source chat identifier as a string
    pub chat_id: Option<String>,
    pub sender: Sender,
    pub content: MessageContent,
}

/// How a file is presented on the destination platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Photo,
    Video,
    Document,
}

impl From<MessageKind> for FileKind {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Photo => FileKind::Photo,
            MessageKind::Video => FileKind::Video,
            // audio and voice travel as generic documents
            MessageKind::Document | MessageKind::Audio | MessageKind::Voice => FileKind::Document,
        }
    }
}

/// A fully formatted file send, ready for a destination client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFile {
    pub kind: FileKind,
    pub url: String,
    pub filename: String,
    pub caption: String,
}

/// Result of one outbound send. Logged and discarded by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { message_id: Option<String> },
    Failed { reason: String },
}

/// Send primitives of a destination platform.
///
/// Implementations never return errors: every transport or provider failure
/// is logged and reported as [`SendOutcome::Failed`].
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_text(&self, chat_id: &str, text: &str) -> SendOutcome;
    async fn send_file(&self, chat_id: &str, file: &OutboundFile) -> SendOutcome;
}

/// Resolves a platform file reference to a downloadable URL.
#[async_trait]
pub trait FileLocator: Send + Sync {
    async fn file_url(&self, file_id: &str) -> Result<String>;
}

/// Truncate text for log lines without splitting a UTF-8 character.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Hide a `/bot<token>/` path segment so file URLs can be logged.
pub fn redact_url(url: &str) -> String {
    let Some(start) = url.find("/bot").map(|i| i + "/bot".len()) else {
        return url.to_string();
    };
    match url[start..].find('/') {
        Some(len) if url[start..start + len].contains(':') => {
            format!("{}***{}", &url[..start], &url[start + len..])
        }
        _ => url.to_string(),
    }
}
