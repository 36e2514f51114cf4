//! Stateless link filter.
//!
//! Any message from a non-privileged user carrying a URL or text-link entity
//! (or a bare URL the client did not entity-tag) is deleted and answered
//! with a public callout. Exemption of privileged senders and channel posts
//! happens in the routing layer.

use crate::api::{best_effort, ChatApi};
use regex::Regex;
use std::sync::LazyLock;
use teloxide::types::{ChatId, Message, MessageEntity, MessageEntityKind, MessageId, UserId};

static BARE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:https?://|www\.|t\.me/)\S+").unwrap()
});

pub fn entities_have_link(entities: &[MessageEntity]) -> bool {
    entities.iter().any(|e| {
        matches!(
            e.kind,
            MessageEntityKind::Url | MessageEntityKind::TextLink { .. }
        )
    })
}

pub fn text_has_link(text: &str) -> bool {
    BARE_URL.is_match(text)
}

/// Whether the message carries any kind of link.
pub fn message_has_link(msg: &Message) -> bool {
    if let Some(entities) = msg.entities() {
        if entities_have_link(entities) {
            return true;
        }
    }
    msg.text().map(text_has_link).unwrap_or(false)
}

/// Delete the offending message and call out the sender. Both best-effort.
pub async fn punish(api: &dyn ChatApi, chat: ChatId, user: UserId, offending: MessageId) {
    best_effort("delete_message", api.delete_message(chat, offending).await).await;
    best_effort(
        "send_message",
        api.send_message(
            chat,
            format!("User {}: advertising links are not allowed here.", user.0),
        )
        .await,
    )
    .await;
}
