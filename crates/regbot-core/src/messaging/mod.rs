//! Cross-messenger abstractions (Telegram today; LINE/Slack later).

pub mod port;
pub mod types;
