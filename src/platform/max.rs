use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::MaxConfig;
use crate::platform::{
    preview, redact_url, Attachment, IncomingMessage, MessageContent, MessageKind, Outbound,
    OutboundFile, SendOutcome, Sender,
};

/// Webhook types that carry (or may carry) a message.
const MESSAGE_WEBHOOKS: [&str; 4] = [
    "incomingMessageReceived",
    "incomingCall",
    "outgoingMessageReceived",
    "outgoingAPIMessageReceived",
];

// ── Webhook payload ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxWebhook {
    pub type_webhook: String,
    #[serde(default)]
    pub id_message: Option<String>,
    #[serde(default)]
    pub sender_data: Option<SenderData>,
    #[serde(default)]
    pub message_data: Option<MessageData>,
}

/// `typeWebhook` of a raw payload, read without parsing the rest.
pub fn webhook_type(payload: &Value) -> Option<&str> {
    payload.get("typeWebhook").and_then(Value::as_str)
}

pub fn is_message_type(type_webhook: &str) -> bool {
    MESSAGE_WEBHOOKS.contains(&type_webhook)
}

impl MaxWebhook {
    pub fn is_message_event(&self) -> bool {
        is_message_type(&self.type_webhook)
    }

    pub fn is_outgoing(&self) -> bool {
        self.type_webhook.to_lowercase().contains("outgoing")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderData {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    #[serde(default)]
    pub type_message: Option<String>,
    #[serde(default)]
    pub text_message_data: Option<TextMessageData>,
    #[serde(default)]
    pub extended_text_message_data: Option<ExtendedTextMessageData>,
    #[serde(default)]
    pub file_message_data: Option<AttachmentField>,
    #[serde(default)]
    pub download_url: Option<AttachmentField>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageData {
    #[serde(default)]
    pub text_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtendedTextMessageData {
    #[serde(default)]
    pub text: Option<String>,
}

/// An attachment field is either a bare URL or a file object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AttachmentField {
    Url(String),
    File(FileMessageData),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMessageData {
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

impl AttachmentField {
    fn url(&self) -> Option<&str> {
        let url = match self {
            AttachmentField::Url(url) => Some(url.as_str()),
            AttachmentField::File(file) => file.download_url.as_deref(),
        };
        url.filter(|u| !u.is_empty())
    }

    fn file_name(&self) -> Option<&str> {
        match self {
            AttachmentField::Url(_) => None,
            AttachmentField::File(file) => file.file_name.as_deref().filter(|n| !n.is_empty()),
        }
    }

    fn caption(&self) -> Option<&str> {
        match self {
            AttachmentField::Url(_) => None,
            AttachmentField::File(file) => file.caption.as_deref(),
        }
    }
}

/// GREEN-API `typeMessage` values.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MaxMessageType {
    Text,
    ExtendedText,
    Image,
    Video,
    Document,
    Audio,
    Voice,
    Other(String),
}

impl MaxMessageType {
    fn parse(raw: &str) -> Self {
        match raw {
            "textMessage" => Self::Text,
            "extendedTextMessage" => Self::ExtendedText,
            "imageMessage" => Self::Image,
            "videoMessage" => Self::Video,
            "documentMessage" => Self::Document,
            "audioMessage" => Self::Audio,
            "voiceMessage" => Self::Voice,
            other => Self::Other(other.to_string()),
        }
    }
}

// ── Classification ─────────────────────────────────────────────────────────────

/// Normalize a GREEN-API message webhook.
///
/// Events without `messageData` (e.g. `incomingCall`) classify as unsupported.
pub fn classify(webhook: &MaxWebhook) -> IncomingMessage {
    let sender_data = webhook.sender_data.clone().unwrap_or_default();

    let chat_id = sender_data
        .chat_id
        .clone()
        .filter(|c| !c.is_empty())
        .or_else(|| sender_data.sender.clone());
    let sender = Sender::new(
        sender_data
            .sender_name
            .clone()
            .filter(|n| !n.is_empty())
            .or(sender_data.name.clone()),
        sender_data
            .sender
            .as_deref()
            .map(|s| s.replace("@c.us", "")),
    );

    let content = match &webhook.message_data {
        Some(data) => classify_message_data(data),
        None => MessageContent::Unsupported(webhook.type_webhook.clone()),
    };

    IncomingMessage {
        chat_id,
        sender,
        content,
    }
}

fn classify_message_data(data: &MessageData) -> MessageContent {
    let type_message = data.type_message.clone().unwrap_or_default();
    match MaxMessageType::parse(&type_message) {
        MaxMessageType::Text => MessageContent::Text(
            data.text_message_data
                .as_ref()
                .and_then(|t| t.text_message.clone())
                .unwrap_or_default(),
        ),
        MaxMessageType::ExtendedText => MessageContent::Text(
            data.extended_text_message_data
                .as_ref()
                .and_then(|t| t.text.clone())
                .unwrap_or_default(),
        ),
        MaxMessageType::Image => file_content(data, MessageKind::Photo, "photo.jpg"),
        MaxMessageType::Video => file_content(data, MessageKind::Video, "video.mp4"),
        MaxMessageType::Document => file_content(data, MessageKind::Document, "document"),
        MaxMessageType::Audio => file_content(data, MessageKind::Audio, "audio.mp3"),
        MaxMessageType::Voice => file_content(data, MessageKind::Voice, "voice.ogg"),
        MaxMessageType::Other(other) => MessageContent::Unsupported(other),
    }
}

fn file_content(data: &MessageData, kind: MessageKind, default_name: &str) -> MessageContent {
    let field = data.file_message_data.as_ref().or(data.download_url.as_ref());
    let source = field
        .and_then(AttachmentField::url)
        .unwrap_or_default()
        .to_string();

    let filename = field
        .and_then(AttachmentField::file_name)
        .unwrap_or(default_name)
        .to_string();

    let caption = field
        .and_then(AttachmentField::caption)
        .or(data.caption.as_deref())
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    MessageContent::File(Attachment {
        kind,
        source,
        filename,
        caption,
    })
}

// ── GREEN-API client ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    message: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendFileByUrlRequest<'a> {
    chat_id: &'a str,
    url_file: &'a str,
    file_name: &'a str,
    caption: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    #[serde(default)]
    id_message: Option<String>,
}

/// Sends to Max through GREEN-API. Files are passed by URL, never downloaded.
pub struct GreenApiClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl GreenApiClient {
    pub fn new(client: reqwest::Client, config: &MaxConfig) -> Self {
        let base_url = config.effective_api_url();
        info!("GREEN-API client initialized: {}", base_url);
        Self {
            client,
            base_url,
            api_token: config.api_token.clone(),
        }
    }

    async fn call<T: Serialize + ?Sized>(&self, method: &str, body: &T) -> Result<SendResponse> {
        let url = format!("{}/{}/{}", self.base_url, method, self.api_token);

        debug!("Calling GREEN-API method: {}", method);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Failed to send request to GREEN-API {method}"))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("GREEN-API error ({}): {}", status, error_body);
        }

        // Delivered at this point; an unreadable body only loses the message id.
        let raw = response.text().await.unwrap_or_default();
        match serde_json::from_str(&raw) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                warn!("Unexpected GREEN-API {} response ({}): {}", method, e, preview(&raw, 100));
                Ok(SendResponse::default())
            }
        }
    }
}

/// Max chat ids are bare numbers (negative for groups); strip suffixes
/// users copy over from WhatsApp-style ids.
pub fn sanitize_chat_id(chat_id: &str) -> String {
    chat_id.replace("@c.us", "").replace("@g.us", "")
}

#[async_trait]
impl Outbound for GreenApiClient {
    async fn send_text(&self, chat_id: &str, text: &str) -> SendOutcome {
        let chat_id = sanitize_chat_id(chat_id);
        let request = SendMessageRequest {
            chat_id: &chat_id,
            message: text,
        };
        match self.call("sendMessage", &request).await {
            Ok(response) => {
                info!(
                    "Text message sent to Max chat {}: {} (ID: {:?})",
                    chat_id,
                    preview(text, 50),
                    response.id_message
                );
                SendOutcome::Sent {
                    message_id: response.id_message,
                }
            }
            Err(e) => {
                error!(
                    "Failed to send text to Max chat {} ({}): {:#}",
                    chat_id,
                    preview(text, 50),
                    e
                );
                SendOutcome::Failed {
                    reason: format!("{e:#}"),
                }
            }
        }
    }

    async fn send_file(&self, chat_id: &str, file: &OutboundFile) -> SendOutcome {
        let chat_id = sanitize_chat_id(chat_id);
        let request = SendFileByUrlRequest {
            chat_id: &chat_id,
            url_file: &file.url,
            file_name: &file.filename,
            caption: &file.caption,
        };
        match self.call("sendFileByUrl", &request).await {
            Ok(response) => {
                info!(
                    "File sent to Max chat {}: {} (ID: {:?})",
                    chat_id, file.filename, response.id_message
                );
                SendOutcome::Sent {
                    message_id: response.id_message,
                }
            }
            Err(e) => {
                error!(
                    "Failed to send file {} to Max chat {} ({}): {:#}",
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::FileKind;
    use serde_json::json;

    fn webhook(value: serde_json::Value) -> MaxWebhook {
        serde_json::from_value(value).unwrap()
    }

    fn text_event(type_webhook: &str) -> serde_json::Value {
        json!({
            "typeWebhook": type_webhook,
            "idMessage": "BAE5",
            "senderData": {
                "chatId": "-69020002426896",
                "sender": "16958332@c.us",
                "senderName": "Alice"
            },
            "messageData": {
                "typeMessage": "textMessage",
                "textMessageData": { "textMessage": "Hello" }
            }
        })
    }

    #[test]
    fn test_event_allow_list() {
        assert!(webhook(text_event("incomingMessageReceived")).is_message_event());
        assert!(webhook(text_event("outgoingAPIMessageReceived")).is_message_event());
        assert!(!webhook(text_event("stateInstanceChanged")).is_message_event());
        assert!(webhook(text_event("outgoingMessageReceived")).is_outgoing());
    }

    #[test]
    fn test_text_message() {
        let msg = classify(&webhook(text_event("incomingMessageReceived")));
        assert_eq!(msg.chat_id.as_deref(), Some("-69020002426896"));
        assert_eq!(msg.sender.name.as_deref(), Some("Alice"));
        assert_eq!(msg.sender.handle.as_deref(), Some("16958332"));
        assert_eq!(msg.content, MessageContent::Text("Hello".into()));
    }

    #[test]
    fn test_extended_text_and_sender_fallbacks() {
        let msg = classify(&webhook(json!({
            "typeWebhook": "outgoingMessageReceived",
            "senderData": { "sender": "16958332", "name": "Bob" },
            "messageData": {
                "typeMessage": "extendedTextMessage",
                "extendedTextMessageData": { "text": "link https://x" }
            }
        })));
        assert_eq!(msg.chat_id.as_deref(), Some("16958332"));
        assert_eq!(msg.sender.name.as_deref(), Some("Bob"));
        assert_eq!(msg.content, MessageContent::Text("link https://x".into()));
    }

    #[test]
    fn test_image_with_plain_url_attachment() {
        let msg = classify(&webhook(json!({
            "typeWebhook": "incomingMessageReceived",
            "senderData": { "chatId": "1" },
            "messageData": {
                "typeMessage": "imageMessage",
                "downloadUrl": "http://x/img.png"
            }
        })));
        assert_eq!(
            msg.content,
            MessageContent::File(Attachment {
                kind: MessageKind::Photo,
                source: "http://x/img.png".into(),
                filename: "photo.jpg".into(),
                caption: None,
            })
        );
    }

    #[test]
    fn test_video_with_structured_attachment_and_caption() {
        let msg = classify(&webhook(json!({
            "typeWebhook": "incomingMessageReceived",
            "senderData": { "chatId": "1" },
            "messageData": {
                "typeMessage": "videoMessage",
                "fileMessageData": { "downloadUrl": "http://x/v.mov", "fileName": "v.mov" },
                "caption": "look"
            }
        })));
        let MessageContent::File(att) = msg.content else {
            panic!("expected file");
        };
        assert_eq!(att.kind, MessageKind::Video);
        assert_eq!(att.source, "http://x/v.mov");
        assert_eq!(att.filename, "v.mov");
        assert_eq!(att.caption.as_deref(), Some("look"));
    }

    #[test]
    fn test_document_uses_explicit_filename() {
        let msg = classify(&webhook(json!({
            "typeWebhook": "incomingMessageReceived",
            "senderData": { "chatId": "1" },
            "messageData": {
                "typeMessage": "documentMessage",
                "fileMessageData": {
                    "downloadUrl": "http://x/doc.pdf",
                    "fileName": "report.pdf",
                    "caption": "Q3"
                }
            }
        })));
        let MessageContent::File(att) = msg.content else {
            panic!("expected file");
        };
        assert_eq!(att.filename, "report.pdf");
        assert_eq!(att.caption.as_deref(), Some("Q3"));
    }

    #[test]
    fn test_filename_fallbacks() {
        for (type_message, kind, name) in [
            ("documentMessage", MessageKind::Document, "document"),
            ("audioMessage", MessageKind::Audio, "audio.mp3"),
            ("voiceMessage", MessageKind::Voice, "voice.ogg"),
        ] {
            let msg = classify(&webhook(json!({
                "typeWebhook": "incomingMessageReceived",
                "senderData": { "chatId": "1" },
                "messageData": {
                    "typeMessage": type_message,
                    "fileMessageData": { "downloadUrl": "http://x/f" }
                }
            })));
            let MessageContent::File(att) = msg.content else {
                panic!("expected file for {type_message}");
            };
            assert_eq!(att.kind, kind);
            assert_eq!(att.filename, name);
        }
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let msg = classify(&webhook(json!({
            "typeWebhook": "incomingMessageReceived",
            "senderData": { "chatId": "1" },
            "messageData": { "typeMessage": "stickerMessage" }
        })));
        assert_eq!(msg.content, MessageContent::Unsupported("stickerMessage".into()));

        let call = classify(&webhook(json!({
            "typeWebhook": "incomingCall",
            "senderData": { "chatId": "1" }
        })));
        assert_eq!(call.content, MessageContent::Unsupported("incomingCall".into()));
    }

    #[test]
    fn test_sanitize_chat_id() {
        assert_eq!(sanitize_chat_id("16958332@c.us"), "16958332");
        assert_eq!(sanitize_chat_id("-69020002426896@g.us"), "-69020002426896");
        assert_eq!(sanitize_chat_id("-69020002426896"), "-69020002426896");
    }

    fn client_for(server: &mockito::Server) -> GreenApiClient {
        GreenApiClient::new(
            reqwest::Client::new(),
            &MaxConfig {
                instance_id: "1101000001".into(),
                api_token: "tok".into(),
                api_url: Some(server.url()),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_send_text_posts_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sendMessage/tok")
            .match_body(mockito::Matcher::Json(json!({
                "chatId": "-69020002426896",
                "message": "hi"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"idMessage":"BAE5F4886AD8A6A7"}"#)
            .create_async()
            .await;

        let outcome = client_for(&server)
            .send_text("-69020002426896@g.us", "hi")
            .await;

        assert_eq!(
            outcome,
            SendOutcome::Sent {
                message_id: Some("BAE5F4886AD8A6A7".into())
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_file_by_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sendFileByUrl/tok")
            .match_body(mockito::Matcher::Json(json!({
                "chatId": "42",
                "urlFile": "https://files/x.pdf",
                "fileName": "x.pdf",
                "caption": "📄 x.pdf"
            })))
            .with_status(200)
            .with_body(r#"{"idMessage":"ID1"}"#)
            .create_async()
            .await;

        let file = OutboundFile {
            kind: FileKind::Document,
            url: "https://files/x.pdf".into(),
            filename: "x.pdf".into(),
            caption: "📄 x.pdf".into(),
        };
        let outcome = client_for(&server).send_file("42", &file).await;

        assert!(matches!(outcome, SendOutcome::Sent { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_provider_error_becomes_failed_outcome() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/sendMessage/tok")
            .with_status(500)
            .with_body("quota exceeded")
            .create_async()
            .await;

        let outcome = client_for(&server).send_text("42", "hi").await;

        match outcome {
            SendOutcome::Failed { reason } => assert!(reason.contains("quota exceeded")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreadable_success_body_still_counts_as_sent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/sendMessage/tok")
            .with_status(200)
            .with_body("OK")
            .create_async()
            .await;

        let outcome = client_for(&server).send_text("42", "hi").await;

        assert_eq!(outcome, SendOutcome::Sent { message_id: None });
    }

    #[test]
    fn test_webhook_type_read_from_raw_payload() {
        let state = json!({ "typeWebhook": "stateInstanceChanged", "senderData": { "chatId": 123 } });
        assert_eq!(webhook_type(&state), Some("stateInstanceChanged"));
        assert!(!is_message_type("stateInstanceChanged"));

        assert_eq!(webhook_type(&json!({ "instanceData": { "idInstance": 1 } })), None);
        assert!(is_message_type("incomingMessageReceived"));
    }

    #[test]
    fn test_null_text_is_empty() {
        let mut event = text_event("incomingMessageReceived");
        event["messageData"]["textMessageData"]["textMessage"] = serde_json::Value::Null;
        let msg = classify(&webhook(event));
        assert_eq!(msg.content, MessageContent::Text(String::new()));

        let msg = classify(&webhook(json!({
            "typeWebhook": "incomingMessageReceived",
            "messageData": {
                "typeMessage": "extendedTextMessage",
                "extendedTextMessageData": { "text": null }
            }
        })));
        assert_eq!(msg.content, MessageContent::Text(String::new()));
    }
}
