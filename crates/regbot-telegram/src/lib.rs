//! Telegram adapter (teloxide).
//!
//! This crate implements the `regbot-core` MessagingPort over Telegram Bot API.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ChatKind};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use regbot_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, UserProfile},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn from_token(token: &str) -> Self {
        Self::new(Bot::new(token))
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

/// "First Last" of a private chat, falling back to the username.
fn private_chat_name(kind: &ChatKind) -> Option<String> {
    let ChatKind::Private(p) = kind else {
        return None;
    };
    let full = [p.first_name.as_deref(), p.last_name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    if !full.trim().is_empty() {
        return Some(full);
    }
    p.username.clone()
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_profile_lookup: true,
            max_message_len: 4096,
        }
    }

    async fn send_reply(&self, to: MessageRef, text: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .send_message(Self::tg_chat(to.chat_id), text.to_string())
                .reply_to_message_id(Self::tg_msg_id(to.message_id))
                .allow_sending_without_reply(true)
        })
        .await?;
        Ok(())
    }

    async fn send_push(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .send_message(Self::tg_chat(chat_id), text.to_string())
        })
        .await?;
        Ok(())
    }

    async fn get_profile(&self, user_id: UserId) -> Result<UserProfile> {
        // A user's private chat with the bot shares the user's id.
        let chat = self
            .with_retry(|| self.bot.get_chat(teloxide::types::ChatId(user_id.0)))
            .await?;

        let display_name = private_chat_name(&chat.kind).ok_or_else(|| {
            Error::External(format!("telegram profile for {} has no name", user_id.0))
        })?;
        Ok(UserProfile {
            user_id,
            display_name,
        })
    }
}
