//! User-visible chat log and the notice surface the negotiator reports to.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

use super::message::{ChatMessage, MessageType};
use super::transcript::{AddOutcome, TranscriptAccumulator};

/// Where connection status and errors are shown to the user.
pub trait NoticeSink: Send + Sync {
    /// A status line.
    fn system(&self, text: &str);

    /// An error line. Unless `force` is set, a text identical to the previous
    /// error is suppressed.
    ///
    /// # Returns
    ///
    /// `true` if a message was shown.
    fn error(&self, text: &str, force: bool) -> bool;
}

/// A change to the chat log, for renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatUpdate {
    pub outcome: AddOutcome,
    pub message: ChatMessage,
}

const UPDATE_BUFFER: usize = 64;

#[derive(Debug, Default)]
struct ChatLogState {
    transcript: TranscriptAccumulator,
    last_error: Option<String>,
}

/// The chat panel: remote transcript messages plus local notices.
///
/// Owned by the composition root and shared by `Arc`.
pub struct ChatLog {
    history_limit: usize,
    state: Mutex<ChatLogState>,
    updates: broadcast::Sender<ChatUpdate>,
}

impl ChatLog {
    /// `history_limit == 0` keeps everything.
    pub fn new(history_limit: usize) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        Self {
            history_limit,
            state: Mutex::new(ChatLogState::default()),
            updates,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChatLogState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Receives every change made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatUpdate> {
        self.updates.subscribe()
    }

    /// Adds a message, or updates the one with the same id.
    pub fn write_message(&self, message: ChatMessage) -> AddOutcome {
        let (outcome, current) = {
            let mut state = self.lock();
            let id = message.message_id.clone();
            let outcome = state.transcript.add_message(message);
            if self.history_limit > 0 {
                state.transcript.trim_to(self.history_limit);
            }
            let current = state.transcript.get(&id).cloned();
            (outcome, current)
        };

        tracing::debug!("[ChatLog] {:?} message", outcome);
        if let Some(message) = current {
            // No receivers is fine.
            let _ = self.updates.send(ChatUpdate { outcome, message });
        }
        outcome
    }

    /// Writes a status notice and returns its id.
    pub fn write_system_message(&self, text: &str) -> String {
        self.write_notice(MessageType::System, text)
    }

    /// Writes an error notice unless it repeats the previous error.
    ///
    /// # Returns
    ///
    /// The new message id, or `None` if suppressed.
    pub fn write_error_message(&self, text: &str, force: bool) -> Option<String> {
        {
            let mut state = self.lock();
            if !force && state.last_error.as_deref() == Some(text) {
                tracing::debug!("[ChatLog] Suppressed repeated error: {}", text);
                return None;
            }
            state.last_error = Some(text.to_string());
        }
        Some(self.write_notice(MessageType::Error, text))
    }

    /// Writes a conversation-reset marker and returns its id.
    pub fn write_reset_message(&self, text: &str) -> String {
        self.write_notice(MessageType::Reset, text)
    }

    fn write_notice(&self, message_type: MessageType, text: &str) -> String {
        let message = ChatMessage::system(message_type, text);
        let id = message.message_id.clone();
        self.write_message(message);
        id
    }

    /// Snapshot of the log, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().transcript.units().to_vec()
    }

    pub fn get(&self, message_id: &str) -> Option<ChatMessage> {
        self.lock().transcript.get(message_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().transcript.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new(0)
    }
}

impl NoticeSink for ChatLog {
    fn system(&self, text: &str) {
        self.write_system_message(text);
    }

    fn error(&self, text: &str, force: bool) -> bool {
        self.write_error_message(text, force).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_error_is_suppressed() {
        let log = ChatLog::new(0);
        assert!(log.write_error_message("boom", false).is_some());
        assert!(log.write_error_message("boom", false).is_none());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_forced_error_always_written() {
        let log = ChatLog::new(0);
        log.write_error_message("boom", false);
        assert!(log.write_error_message("boom", true).is_some());
        assert!(log.write_error_message("boom", true).is_some());
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_dedup_is_against_last_error_only() {
        let log = ChatLog::new(0);
        assert!(log.error("a", false));
        assert!(log.error("b", false));
        assert!(log.error("a", false));
        // System notices in between do not reset it.
        log.system("status");
        assert!(!log.error("a", false));
    }

    #[test]
    fn test_history_limit() {
        let log = ChatLog::new(2);
        log.write_system_message("1");
        log.write_system_message("2");
        log.write_reset_message("3");
        let texts: Vec<_> = log.messages().into_iter().map(|m| m.message).collect();
        assert_eq!(texts, vec!["2", "3"]);
        assert_eq!(log.messages()[1].message_type, MessageType::Reset);
    }

    #[test]
    fn test_subscribers_see_updates() {
        let log = ChatLog::new(0);
        let mut rx = log.subscribe();

        let mut msg = ChatMessage::new(MessageType::User, "guest", "Guest", "hel");
        log.write_message(msg.clone());
        msg.message = "hello".to_string();
        log.write_message(msg);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.outcome, AddOutcome::Added);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.outcome, AddOutcome::Updated);
        assert_eq!(second.message.message, "hello");
    }
}
