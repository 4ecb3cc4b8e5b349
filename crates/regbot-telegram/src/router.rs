use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use regbot_core::bot::RegistrationBot;

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<RegistrationBot>,
}

/// Long-poll Telegram until Ctrl-C. Returns once the dispatcher has stopped.
pub async fn run_polling(tg: Bot, bot: Arc<RegistrationBot>) -> anyhow::Result<()> {
    match tg.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "telegram bot started"),
        Err(e) => tracing::warn!(error = %e, "getMe failed; polling anyway"),
    }

    let state = Arc::new(AppState { bot });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(tg, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("telegram dispatcher stopped");
    Ok(())
}
