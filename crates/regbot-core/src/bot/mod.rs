//! Inbound message routing: command table, multi-step flow and replies.

pub mod commands;

use std::sync::Arc;

use chrono::Local;

use crate::{
    connection::ConnectionManager,
    domain::{ChatId, RegistrationRecord, RegistrationStatus, Serial, UserId},
    mail::Mailer,
    messaging::{port::MessagingPort, types::IncomingMessage},
    registry::SequentialRegistry,
    state::EphemeralStateStore,
    table::TableService,
    Result,
};

use commands::{
    fit_message, format_duration, parse_command, CommandKind, ADMIN_ONLY, DEFAULT_REPLY, GROUP_REFUSAL,
    HELP_TEXT,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Knobs the router reads from [`crate::config::Config`].
#[derive(Clone, Copy, Debug, Default)]
pub struct BotSettings {
    pub admin_chat_id: Option<ChatId>,
    pub detect_serial_conflicts: bool,
}

/// Everything a command handler needs, built once in the composition root.
pub struct RegistrationBot {
    registry: Arc<SequentialRegistry>,
    states: Arc<EphemeralStateStore>,
    connections: Arc<ConnectionManager<dyn TableService>>,
    messenger: Arc<dyn MessagingPort>,
    mailer: Arc<dyn Mailer>,
    settings: BotSettings,
}

impl RegistrationBot {
    pub fn new(
        registry: Arc<SequentialRegistry>,
        states: Arc<EphemeralStateStore>,
        connections: Arc<ConnectionManager<dyn TableService>>,
        messenger: Arc<dyn MessagingPort>,
        mailer: Arc<dyn Mailer>,
        settings: BotSettings,
    ) -> Self {
        Self {
            registry,
            states,
            connections,
            messenger,
            mailer,
            settings,
        }
    }

    /// Handle one inbound text message. Never fails: errors end up as an
    /// apology reply plus a log line.
    pub async fn handle_message(&self, msg: IncomingMessage) {
        if !msg.is_private {
            self.reply(&msg, GROUP_REFUSAL).await;
            return;
        }

        let key = state_key(msg.user_id);
        let text = msg.text.trim();

        if text.starts_with('/') {
            self.states.clear(&key);
            let (token, args) = parse_command(text);
            match CommandKind::lookup(&token) {
                Some(kind) => self.dispatch(kind, &msg, &args).await,
                None => self.reply(&msg, DEFAULT_REPLY).await,
            }
            return;
        }

        let pending = self
            .states
            .get(&key)
            .and_then(|st| CommandKind::from_pending_state(&st));
        if let Some(kind) = pending {
            self.states.clear(&key);
            self.dispatch(kind, &msg, text).await;
            return;
        }

        self.reply(&msg, DEFAULT_REPLY).await;
    }

    async fn dispatch(&self, kind: CommandKind, msg: &IncomingMessage, args: &str) {
        tracing::info!(command = kind.name(), user = msg.user_id.0, "command received");

        let result = match kind {
            CommandKind::Register => self.register(msg).await,
            CommandKind::Query => self.query(msg, args).await,
            CommandKind::Cancel => self.cancel(msg, args).await,
            CommandKind::Help => {
                self.reply(msg, HELP_TEXT).await;
                Ok(())
            }
            CommandKind::Status => self.status(msg).await,
            CommandKind::TestMail => self.test_mail(msg).await,
        };

        if let Err(e) = result {
            tracing::error!(
                command = kind.name(),
                user = msg.user_id.0,
                args,
                error = %e,
                "command failed"
            );
            self.reply(msg, kind.failure_reply()).await;
        }
    }

    /// Parse the serial argument, or start the multi-step flow when it is missing.
    async fn serial_argument(
        &self,
        kind: CommandKind,
        msg: &IncomingMessage,
        args: &str,
    ) -> Option<Serial> {
        if args.is_empty() {
            if let Some(prompt) = kind.argument_prompt() {
                self.states.set(&state_key(msg.user_id), kind.pending_state());
                self.reply(msg, prompt).await;
            }
            return None;
        }
        let serial = Serial::parse(args);
        if serial.is_none() {
            if let Some(usage) = kind.usage() {
                self.reply(msg, usage).await;
            }
        }
        serial
    }

    async fn register(&self, msg: &IncomingMessage) -> Result<()> {
        let serial = self.registry.allocate_serial().await?;
        let record = RegistrationRecord {
            serial,
            requester_id: msg.user_id.0.to_string(),
            display_name: self.display_name(msg).await,
            timestamp: msg
                .sent_at
                .with_timezone(&Local)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            status: RegistrationStatus::Pending,
        };
        self.registry.append_record(&record).await?;

        if self.settings.detect_serial_conflicts {
            self.check_serial_conflict(serial).await;
        }

        self.reply(msg, &format!("登記成功！您的序號是：{serial}"))
            .await;
        self.notify_registration(&record);
        Ok(())
    }

    async fn query(&self, msg: &IncomingMessage, args: &str) -> Result<()> {
        let Some(serial) = self.serial_argument(CommandKind::Query, msg, args).await else {
            return Ok(());
        };

        let text = match self.registry.find_by_serial(serial).await? {
            Some(fields) => {
                let schema = self.registry.schema();
                let field = |header: &str| {
                    fields
                        .get(header)
                        .filter(|v| !v.is_empty())
                        .cloned()
                        .unwrap_or_else(|| "N/A".to_string())
                };
                format!(
                    "查詢結果 - {} {serial}:\n{}: {}\n{}: {}\n{}: {}",
                    schema.serial_header,
                    schema.timestamp_header,
                    field(&schema.timestamp_header),
                    schema.display_name_header,
                    field(&schema.display_name_header),
                    schema.status_header,
                    field(&schema.status_header),
                )
            }
            None => format!("找不到序號 {serial} 的登記紀錄。"),
        };
        self.reply(msg, &text).await;
        Ok(())
    }

    async fn cancel(&self, msg: &IncomingMessage, args: &str) -> Result<()> {
        let Some(serial) = self.serial_argument(CommandKind::Cancel, msg, args).await else {
            return Ok(());
        };

        let text = if self
            .registry
            .update_status(serial, RegistrationStatus::Cancelled)
            .await?
        {
            format!(
                "序號 {serial} 已成功標記為「{}」。",
                RegistrationStatus::Cancelled.label()
            )
        } else {
            format!("找不到序號 {serial} 或無法更新狀態。")
        };
        self.reply(msg, &text).await;
        Ok(())
    }

    async fn status(&self, msg: &IncomingMessage) -> Result<()> {
        let health = self.connections.health_check();
        let mut text = format!("試算表連線：{}", health.as_str());
        if let crate::connection::HealthStatus::Healthy { uptime } = health {
            text.push_str(&format!("（已連線 {}）", format_duration(uptime)));
        }
        text.push_str(&format!("\n進行中的多步驟指令：{}", self.states.len()));
        self.reply(msg, &text).await;
        Ok(())
    }

    async fn test_mail(&self, msg: &IncomingMessage) -> Result<()> {
        let Some(admin) = self.settings.admin_chat_id.filter(|id| *id == msg.chat_id) else {
            self.reply(msg, ADMIN_ONLY).await;
            return Ok(());
        };

        self.mailer
            .send("測試郵件", "這是一封來自登記機器人的測試郵件。")
            .await?;
        let confirmation = if self.mailer.delivers() {
            "測試郵件已送出。"
        } else {
            "未設定郵件寄送，測試郵件僅寫入日誌。"
        };
        if let Err(e) = self.messenger.send_push(admin, confirmation).await {
            tracing::warn!(error = %e, "failed to push test mail confirmation");
        }
        Ok(())
    }

    /// Messenger profile name, falling back to the name carried by the update.
    async fn display_name(&self, msg: &IncomingMessage) -> String {
        let fallback = || {
            msg.sender_name
                .clone()
                .unwrap_or_else(|| msg.user_id.0.to_string())
        };
        if !self.messenger.capabilities().supports_profile_lookup {
            return fallback();
        }
        match self.messenger.get_profile(msg.user_id).await {
            Ok(profile) => profile.display_name,
            Err(e) => {
                tracing::warn!(user = msg.user_id.0, error = %e, "profile lookup failed");
                fallback()
            }
        }
    }

    /// Count rows carrying `serial` and alert the admin on duplicates.
    /// Never fails the registration.
    async fn check_serial_conflict(&self, serial: Serial) {
        match self.registry.serial_occurrences(serial).await {
            Ok(n) if n > 1 => {
                tracing::warn!(serial = %serial, occurrences = n, "duplicate serial allocated");
                if let Some(admin) = self.settings.admin_chat_id {
                    let text = format!("⚠️ 序號 {serial} 重複出現 {n} 次，請人工確認。");
                    if let Err(e) = self.messenger.send_push(admin, &text).await {
                        tracing::warn!(error = %e, "failed to push serial conflict alert");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(serial = %serial, error = %e, "serial conflict check failed"),
        }
    }

    /// Operator email and admin push, off the request path.
    fn notify_registration(&self, record: &RegistrationRecord) {
        let serial = record.serial;
        let subject = format!("新的登記訊息 - 序號 {serial}");
        let body = format!(
            "用戶 {} (ID: {}) 於 {} 登記，序號為 {serial}。\n詳細資料請參考 Google Sheet。",
            record.display_name, record.requester_id, record.timestamp
        );

        let mailer = self.mailer.clone();
        let mail_subject = subject.clone();
        tokio::spawn(async move {
            match mailer.send(&mail_subject, &body).await {
                Ok(()) if mailer.delivers() => {
                    tracing::info!(serial = %serial, "registration email sent")
                }
                Ok(()) => tracing::info!(serial = %serial, "registration email logged only"),
                Err(e) => tracing::error!(serial = %serial, error = %e, "registration email failed"),
            }
        });

        if let Some(admin) = self.settings.admin_chat_id {
            let messenger = self.messenger.clone();
            tokio::spawn(async move {
                if let Err(e) = messenger.send_push(admin, &subject).await {
                    tracing::warn!(serial = %serial, error = %e, "admin push failed");
                }
            });
        }
    }

    async fn reply(&self, msg: &IncomingMessage, text: &str) {
        let limit = self.messenger.capabilities().max_message_len;
        let text = fit_message(text, limit);
        if let Err(e) = self.messenger.send_reply(msg.reply_target(), &text).await {
            tracing::warn!(chat = msg.chat_id.0, error = %e, "failed to send reply");
        }
    }
}

fn state_key(user_id: UserId) -> String {
    user_id.0.to_string()
}
