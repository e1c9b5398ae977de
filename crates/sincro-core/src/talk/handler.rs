use crate::chat::ChatMessage;

use super::message::MoraEvent;

/// Receives validated messages from the data channels.
///
/// Implementations are handed to the channel router at construction and are
/// called from the transport's event task, so they must not block.
pub trait TalkEventHandler: Send + Sync {
    /// A telop channel message.
    fn on_mora(&self, event: MoraEvent);

    /// A transcript channel message.
    fn on_chat(&self, message: ChatMessage);
}
