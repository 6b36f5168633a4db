//! Telegram update handlers.
//!
//! Each handler is a small adapter that:
//! - turns a Telegram update into an `IncomingUpdate`
//! - maps it to a dialogue event (or ignores it)
//! - lets the engine transition and deliver the replies

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};
use tracing::debug;

use hrzone_core::{
    dialogue::Event,
    domain::{ChatId, MessageRef},
    messaging::types::IncomingUpdate,
};

use crate::router::AppState;
mod callback;
mod commands;
mod text;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        debug!(chat = msg.chat.id.0, "ignoring non-text message");
        return Ok(());
    };

    let update = if text.starts_with('/') {
        commands::to_update(&msg, text)
    } else {
        text::to_update(&msg, text)
    };

    if let Some(update) = update {
        route(update, &state, None).await;
    }
    Ok(())
}

/// Feed an update to the engine. Updates that map to no event are dropped.
pub(crate) async fn route(
    update: IncomingUpdate,
    state: &AppState,
    restart_notice: Option<MessageRef>,
) {
    let (user_id, chat_id) = match &update {
        IncomingUpdate::Command(c) => (c.user_id, c.chat_id),
        IncomingUpdate::Text(t) => (t.user_id, t.chat_id),
        IncomingUpdate::Callback(q) => (q.user_id, q.chat_id),
    };

    let Some(event) = Event::from_update(&update) else {
        debug!(user = user_id.0, "ignoring update: {update:?}");
        return;
    };

    state
        .engine
        .dispatch(
            user_id,
            chat_id,
            event,
            state.messenger.as_ref(),
            restart_notice,
        )
        .await;
}

pub(crate) fn chat_of(msg: &Message) -> ChatId {
    ChatId(msg.chat.id.0)
}
