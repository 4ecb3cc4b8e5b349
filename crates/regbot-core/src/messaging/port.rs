use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef, UserId},
    messaging::types::{MessagingCapabilities, UserProfile},
    Result,
};

/// Cross-messenger port.
///
/// Every call may fail with [`crate::Error::External`]; callers log and carry
/// on rather than tearing down the request.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// Reply in the chat the message came from.
    async fn send_reply(&self, to: MessageRef, text: &str) -> Result<()>;

    /// Unsolicited message to a chat (operator alerts).
    async fn send_push(&self, chat_id: ChatId, text: &str) -> Result<()>;

    async fn get_profile(&self, user_id: UserId) -> Result<UserProfile>;
}
