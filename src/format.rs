//! Caption defaults and sender attribution for outbound messages.

use crate::platform::{MessageKind, Sender};

/// Caption used when a file arrives without one. Applied before attribution
/// so the default still carries the sender header.
pub fn default_caption(kind: MessageKind, filename: &str) -> String {
    match kind {
        MessageKind::Photo => "📷 Photo".to_string(),
        MessageKind::Video => "🎥 Video".to_string(),
        MessageKind::Audio => "🎵 Audio".to_string(),
        MessageKind::Voice => "🎤 Voice message".to_string(),
        MessageKind::Document => {
            if filename.is_empty() {
                "📄 Document".to_string()
            } else {
                format!("📄 {filename}")
            }
        }
    }
}

/// The caption to relay for a file: voice notes always use the fixed label,
/// other kinds keep a non-empty original caption.
pub fn caption_or_default(kind: MessageKind, caption: Option<&str>, filename: &str) -> String {
    match caption.filter(|c| !c.trim().is_empty()) {
        Some(c) if kind != MessageKind::Voice => c.to_string(),
        _ => default_caption(kind, filename),
    }
}

/// Attribution for Max (markdown-capable).
///
/// `📨 *From Telegram:* 👤 Name | @handle` followed by a blank line and the text.
pub fn for_max(text: &str, sender: &Sender) -> String {
    if sender.is_anonymous() {
        return text.to_string();
    }
    let mut parts = Vec::with_capacity(2);
    if let Some(name) = &sender.name {
        parts.push(format!("👤 {name}"));
    }
    if let Some(handle) = &sender.handle {
        parts.push(format!("@{}", handle.trim_start_matches('@')));
    }
    format!("📨 *From Telegram:* {}\n\n{}", parts.join(" | "), text)
}

/// Attribution for Telegram (HTML parse mode). Only the display name is shown.
pub fn for_telegram(text: &str, sender: &Sender) -> String {
    match &sender.name {
        Some(name) => format!("👤 <b>{}</b>\n\n{}", escape_html(name), text),
        None => text.to_string(),
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Sender {
        Sender::new(Some("Alice".into()), Some("alice99".into()))
    }

    #[test]
    fn test_max_header_with_name_and_handle() {
        assert_eq!(
            for_max("Hello", &alice()),
            "📨 *From Telegram:* 👤 Alice | @alice99\n\nHello"
        );
    }

    #[test]
    fn test_max_header_with_single_field() {
        let name_only = Sender::new(Some("Alice".into()), None);
        assert_eq!(
            for_max("Hi", &name_only),
            "📨 *From Telegram:* 👤 Alice\n\nHi"
        );

        let handle_only = Sender::new(None, Some("alice99".into()));
        assert_eq!(for_max("Hi", &handle_only), "📨 *From Telegram:* @alice99\n\nHi");
    }

    #[test]
    fn test_anonymous_sender_leaves_text_untouched() {
        let nobody = Sender::default();
        assert_eq!(for_max("as is", &nobody), "as is");
        assert_eq!(for_telegram("as <i>is</i>", &nobody), "as <i>is</i>");
    }

    #[test]
    fn test_telegram_header_bold_name() {
        assert_eq!(for_telegram("Hello", &alice()), "👤 <b>Alice</b>\n\nHello");
    }

    #[test]
    fn test_telegram_header_ignores_handle_only_sender() {
        let phone_only = Sender::new(None, Some("79001234567".into()));
        assert_eq!(for_telegram("Hello", &phone_only), "Hello");
    }

    #[test]
    fn test_telegram_name_is_escaped() {
        let sender = Sender::new(Some("<Bob & Co>".into()), None);
        assert_eq!(
            for_telegram("x", &sender),
            "👤 <b>&lt;Bob &amp; Co&gt;</b>\n\nx"
        );
    }

    #[test]
    fn test_default_captions_are_kind_specific() {
        assert_eq!(default_caption(MessageKind::Photo, "ignored.png"), "📷 Photo");
        assert_eq!(default_caption(MessageKind::Video, "clip.mov"), "🎥 Video");
        assert_eq!(default_caption(MessageKind::Document, "report.pdf"), "📄 report.pdf");
        assert_eq!(default_caption(MessageKind::Document, ""), "📄 Document");
        assert_eq!(default_caption(MessageKind::Audio, "song.mp3"), "🎵 Audio");
        assert_eq!(default_caption(MessageKind::Voice, "voice.ogg"), "🎤 Voice message");
    }

    #[test]
    fn test_caption_kept_unless_voice() {
        assert_eq!(
            caption_or_default(MessageKind::Photo, Some("sunset"), "photo.jpg"),
            "sunset"
        );
        assert_eq!(
            caption_or_default(MessageKind::Photo, Some("   "), "photo.jpg"),
            "📷 Photo"
        );
        assert_eq!(
            caption_or_default(MessageKind::Voice, Some("hey"), "voice.ogg"),
            "🎤 Voice message"
        );
    }

    #[test]
    fn test_default_caption_still_gets_attribution() {
        let caption = caption_or_default(MessageKind::Document, None, "report.pdf");
        assert_eq!(
            for_telegram(&caption, &alice()),
            "👤 <b>Alice</b>\n\n📄 report.pdf"
        );
    }
}
