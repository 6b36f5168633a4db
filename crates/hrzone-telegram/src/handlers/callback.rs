use std::sync::Arc;

use teloxide::prelude::*;
use tracing::warn;

use hrzone_core::{
    domain::{MessageId, MessageRef, UserId},
    messaging::types::{CallbackQuery as Callback, IncomingUpdate, RESTART_CALLBACK},
};

use super::{chat_of, route};
use crate::router::AppState;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    // Always answer so the client stops its spinner.
    if let Err(e) = state.messenger.answer_callback_query(&q.id).await {
        warn!("answer_callback_query failed: {e}");
    }

    let (Some(msg), Some(data)) = (q.message.as_ref(), q.data.clone()) else {
        return Ok(());
    };
    let chat_id = chat_of(msg);

    // Only the restart button edits its own message into the "restarted" notice.
    let restart_notice = (data == RESTART_CALLBACK).then_some(MessageRef {
        chat_id,
        message_id: MessageId(msg.id.0),
    });

    let update = IncomingUpdate::Callback(Callback {
        chat_id,
        user_id: UserId(q.from.id.0 as i64),
        data,
    });
    route(update, &state, restart_notice).await;

    Ok(())
}
