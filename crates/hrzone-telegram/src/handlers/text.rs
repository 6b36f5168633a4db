use teloxide::types::Message;

use hrzone_core::{
    domain::UserId,
    messaging::types::{IncomingUpdate, TextMessage},
};

use super::chat_of;

pub(super) fn to_update(msg: &Message, text: &str) -> Option<IncomingUpdate> {
    let user = msg.from()?;
    Some(IncomingUpdate::Text(TextMessage {
        chat_id: chat_of(msg),
        user_id: UserId(user.id.0 as i64),
        text: text.to_string(),
    }))
}
