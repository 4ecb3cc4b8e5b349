//! Telegram update handlers.
//!
//! Converts teloxide messages into the cross-messenger [`IncomingMessage`] and
//! hands them to the core router.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use regbot_core::{
    domain::{ChatId, MessageId, UserId},
    messaging::types::IncomingMessage,
};

use crate::router::AppState;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    match to_incoming(&msg) {
        Some(incoming) => state.bot.handle_message(incoming).await,
        None => tracing::debug!(chat = msg.chat.id.0, "ignoring non-text update"),
    }
    Ok(())
}

/// `None` for anything but a text message from a user.
pub fn to_incoming(msg: &Message) -> Option<IncomingMessage> {
    let text = msg.text()?;
    let from = msg.from()?;
    Some(IncomingMessage {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
        user_id: UserId(from.id.0 as i64),
        sender_name: Some(from.full_name()).filter(|n| !n.trim().is_empty()),
        text: text.to_string(),
        sent_at: msg.date,
        is_private: msg.chat.is_private(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(json: serde_json::Value) -> Message {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn private_text_message_converts() {
        let msg = message(serde_json::json!({
            "message_id": 198283,
            "from": {"id": 250918540, "is_bot": false, "first_name": "Ann", "last_name": "Lee"},
            "chat": {"id": 250918540, "first_name": "Ann", "last_name": "Lee", "type": "private"},
            "date": 1567927221,
            "text": "/查詢 5"
        }));

        let incoming = to_incoming(&msg).unwrap();
        assert_eq!(incoming.chat_id, ChatId(250918540));
        assert_eq!(incoming.message_id, MessageId(198283));
        assert_eq!(incoming.user_id, UserId(250918540));
        assert_eq!(incoming.sender_name.as_deref(), Some("Ann Lee"));
        assert_eq!(incoming.text, "/查詢 5");
        assert_eq!(incoming.sent_at.timestamp(), 1567927221);
        assert!(incoming.is_private);
    }

    #[test]
    fn group_message_is_marked_non_private() {
        let msg = message(serde_json::json!({
            "message_id": 7,
            "from": {"id": 1, "is_bot": false, "first_name": "Ann"},
            "chat": {"id": -100, "title": "team", "type": "group"},
            "date": 1567927221,
            "text": "/登記"
        }));
        assert!(!to_incoming(&msg).unwrap().is_private);
    }

    #[test]
    fn location_without_text_is_skipped() {
        let msg = message(serde_json::json!({
            "message_id": 8,
            "from": {"id": 1, "is_bot": false, "first_name": "Ann"},
            "chat": {"id": 1, "first_name": "Ann", "type": "private"},
            "date": 1567927221,
            "location": {"longitude": 121.5, "latitude": 25.0}
        }));
        assert!(to_incoming(&msg).is_none());
    }
}
