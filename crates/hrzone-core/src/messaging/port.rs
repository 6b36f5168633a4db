use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{InlineKeyboard, OutboundMessage},
    Result,
};

/// Cross-messenger port.
///
/// The dialogue engine only ever talks to the chat platform through this trait.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;
    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn answer_callback_query(&self, callback_id: &str) -> Result<()>;

    /// Send a rendered reply, with its keyboard when it has one.
    async fn send_outbound(&self, chat_id: ChatId, msg: OutboundMessage) -> Result<MessageRef> {
        match msg.keyboard {
            Some(keyboard) => self.send_inline_keyboard(chat_id, &msg.html, keyboard).await,
            None => self.send_html(chat_id, &msg.html).await,
        }
    }
}
