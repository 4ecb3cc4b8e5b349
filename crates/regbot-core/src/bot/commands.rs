//! Command table and user-facing texts.

use std::{borrow::Cow, time::Duration};

use crate::state::StatePayload;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Register,
    Query,
    Cancel,
    Help,
    Status,
    TestMail,
}

/// Command token (without the leading `/`) -> command.
const COMMANDS: &[(&str, CommandKind)] = &[
    ("登記", CommandKind::Register),
    ("register", CommandKind::Register),
    ("查詢", CommandKind::Query),
    ("query", CommandKind::Query),
    ("取消", CommandKind::Cancel),
    ("cancel", CommandKind::Cancel),
    ("start", CommandKind::Help),
    ("help", CommandKind::Help),
    ("status", CommandKind::Status),
    ("testmail", CommandKind::TestMail),
];

pub const GROUP_REFUSAL: &str = "抱歉，本機器人僅支援一對一聊天。";
pub const DEFAULT_REPLY: &str = "我收到你的訊息了！你可以嘗試輸入 /登記 或 /查詢。";
pub const ADMIN_ONLY: &str = "此指令僅限管理員使用。";
pub const HELP_TEXT: &str = "可用指令：\n\
/登記 - 登記並取得序號\n\
/查詢 <序號> - 查詢登記狀態\n\
/取消 <序號> - 取消登記\n\
/status - 服務狀態";

pub const STATE_COMMAND_KEY: &str = "command";

impl CommandKind {
    pub fn lookup(token: &str) -> Option<Self> {
        COMMANDS
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, kind)| *kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Query => "query",
            Self::Cancel => "cancel",
            Self::Help => "help",
            Self::Status => "status",
            Self::TestMail => "testmail",
        }
    }

    /// Apology shown when the command fails.
    pub fn failure_reply(self) -> &'static str {
        match self {
            Self::Register => "登記失敗，請稍後再試。",
            _ => "指令執行失敗，請稍後再試。",
        }
    }

    pub fn usage(self) -> Option<&'static str> {
        match self {
            Self::Query => Some("請輸入要查詢的序號，例如：/查詢 123"),
            Self::Cancel => Some("請輸入要取消的序號，例如：/取消 123"),
            _ => None,
        }
    }

    /// Prompt for the argument when the command was sent without one.
    pub fn argument_prompt(self) -> Option<&'static str> {
        match self {
            Self::Query => Some("請輸入要查詢的序號："),
            Self::Cancel => Some("請輸入要取消的序號："),
            _ => None,
        }
    }

    /// Pending-state payload for a command waiting on its argument.
    pub fn pending_state(self) -> StatePayload {
        let mut payload = StatePayload::new();
        payload.insert(
            STATE_COMMAND_KEY.to_string(),
            serde_json::Value::String(self.name().to_string()),
        );
        payload
    }

    pub fn from_pending_state(payload: &StatePayload) -> Option<Self> {
        let name = payload.get(STATE_COMMAND_KEY)?.as_str()?;
        match name {
            "query" => Some(Self::Query),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// Split `/cmd@botname arg ...` into (`cmd`, `arg ...`).
pub fn parse_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `…`.
pub fn fit_message(text: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return Cow::Borrowed(text);
    }
    let mut cut: String = text.chars().take(max_chars - 1).collect();
    cut.push('…');
    Cow::Owned(cut)
}

pub fn format_duration(d: Duration) -> String {
    let seconds = d.as_secs();
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        return format!("{hours}h {mins}m {secs}s");
    }
    if mins > 0 {
        return format!("{mins}m {secs}s");
    }
    format!("{secs}s")
}
