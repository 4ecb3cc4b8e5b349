use chrono::{DateTime, Utc};

use crate::domain::{ChatId, MessageId, MessageRef, UserId};

/// Cross-messenger inbound text message.
///
/// Platform-specific fields stay in the adapter.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub user_id: UserId,
    /// Sender name as carried by the update itself (fallback for profile lookups).
    pub sender_name: Option<String>,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    /// One-to-one chat with the bot (as opposed to groups/channels).
    pub is_private: bool,
}

impl IncomingMessage {
    pub fn reply_target(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Whether `get_profile` can return a name at all.
    pub supports_profile_lookup: bool,
    /// Longer texts are cut before sending.
    pub max_message_len: usize,
}
