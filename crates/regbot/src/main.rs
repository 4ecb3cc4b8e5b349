use std::sync::Arc;

use regbot_core::{
    bot::{BotSettings, RegistrationBot},
    config::Config,
    connection::ConnectionManager,
    domain::ChatId,
    mail::LogMailer,
    messaging::port::MessagingPort,
    registry::SequentialRegistry,
    state::EphemeralStateStore,
    table::{CachedTableAccessor, TableService},
};
use regbot_sheets::SheetsConnector;
use regbot_telegram::TelegramMessenger;

#[tokio::main]
async fn main() -> Result<(), regbot_core::Error> {
    regbot_core::logging::init("regbot")?;

    let cfg = Config::load()?;

    let connections: Arc<ConnectionManager<dyn TableService>> =
        Arc::new(ConnectionManager::new(SheetsConnector::from_config(&cfg)));
    let accessor = Arc::new(CachedTableAccessor::new(
        connections.clone(),
        cfg.google_sheet_id.clone(),
        cfg.worksheet_name.clone(),
        cfg.table_cache_ttl,
    ));
    let registry = Arc::new(SequentialRegistry::new(
        accessor.clone(),
        cfg.table_schema.clone(),
    ));
    let states = Arc::new(EphemeralStateStore::new(cfg.user_state_ttl));

    let telegram = TelegramMessenger::from_token(&cfg.telegram_bot_token);
    let messenger: Arc<dyn MessagingPort> = Arc::new(telegram.clone());

    let bot = Arc::new(RegistrationBot::new(
        registry,
        states,
        connections.clone(),
        messenger,
        Arc::new(LogMailer::new(cfg.email_receivers.clone())),
        BotSettings {
            admin_chat_id: cfg.admin_chat_id.map(ChatId),
            detect_serial_conflicts: cfg.detect_serial_conflicts,
        },
    ));

    // Warm the worksheet cache; a failure only degrades startup.
    match accessor.get_handle().await {
        Ok(handle) => tracing::info!(
            worksheet = %handle.worksheet().title,
            health = connections.health_check().as_str(),
            "startup healthy"
        ),
        Err(e) => tracing::warn!(error = %e, "startup degraded; sheet unavailable"),
    }

    let polled = regbot_telegram::router::run_polling(telegram.bot(), bot).await;

    connections.close(cfg.shutdown_timeout).await;
    tracing::info!("shutdown complete");

    polled.map_err(|e| regbot_core::Error::External(format!("telegram bot failed: {e}")))
}
