use teloxide::types::Message;

use hrzone_core::{
    domain::UserId,
    messaging::types::{Command, IncomingUpdate},
};

use super::chat_of;

/// Command name without the slash or `@botname` suffix, lowercased. Arguments are dropped.
fn parse_command(text: &str) -> String {
    // Telegram may send `/cmd@botname arg1 ...`
    let first = text.split_whitespace().next().unwrap_or("");

    first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase()
}

pub(super) fn to_update(msg: &Message, text: &str) -> Option<IncomingUpdate> {
    let user = msg.from()?;
    Some(IncomingUpdate::Command(Command {
        chat_id: chat_of(msg),
        user_id: UserId(user.id.0 as i64),
        name: parse_command(text),
    }))
}
