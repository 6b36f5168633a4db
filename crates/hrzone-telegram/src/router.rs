use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{debug, info, warn};

use hrzone_core::{
    config::Config, dialogue::DialogueEngine, messaging::port::MessagingPort,
    session::InMemorySessionStore,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DialogueEngine>,
    pub messenger: Arc<dyn MessagingPort>,
}

pub async fn run_polling(
    cfg: Arc<Config>,
    engine: Arc<DialogueEngine>,
    store: Arc<InMemorySessionStore>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    // Basic startup info.
    match bot.get_me().await {
        Ok(me) => info!("hrzone started: @{}", me.username()),
        Err(e) => warn!("get_me failed: {e}"),
    }
    match store.ttl() {
        Some(ttl) => info!("session ttl: {}s", ttl.as_secs()),
        None => info!("session expiry disabled"),
    }

    if cfg.drop_pending_updates {
        bot.delete_webhook().drop_pending_updates(true).await?;
    }

    // Runs without a TTL too: it also prunes user locks left by dropped handlers.
    tokio::spawn(sweep_sessions(
        store.clone(),
        engine.clone(),
        cfg.session_sweep_interval,
    ));

    let state = Arc::new(AppState {
        engine,
        messenger: Arc::new(TelegramMessenger::new(bot.clone())),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}

/// Purge expired dialogues (no-op without a TTL) and unused per-user locks.
async fn sweep_sessions(
    store: Arc<InMemorySessionStore>,
    engine: Arc<DialogueEngine>,
    every: std::time::Duration,
) {
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        let expired = store.purge_expired().await;
        let locks = engine.locks().prune().await;
        if expired > 0 || locks > 0 {
            debug!(expired, locks, "session sweep");
        }
    }
}
