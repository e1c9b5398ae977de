//! Identity-by-id accumulation of transcript messages.

use std::collections::HashMap;

use super::message::ChatMessage;

/// What [`TranscriptAccumulator::add_message`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new display unit was created.
    Added,
    /// An existing unit's text was replaced.
    Updated,
}

/// Keeps one display unit per `message_id`, in first-arrival order.
///
/// Ordering and dedup beyond identity are left to the ordered channel that
/// feeds it.
#[derive(Debug, Default, Clone)]
pub struct TranscriptAccumulator {
    units: Vec<ChatMessage>,
    index: HashMap<String, usize>,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a unit for an unseen id, or replaces the text of the existing one.
    ///
    /// On update only the text changes; speaker, type and creation time stay
    /// as first received.
    pub fn add_message(&mut self, msg: ChatMessage) -> AddOutcome {
        if let Some(&pos) = self.index.get(&msg.message_id) {
            self.units[pos].message = msg.message;
            return AddOutcome::Updated;
        }
        self.index.insert(msg.message_id.clone(), self.units.len());
        self.units.push(msg);
        AddOutcome::Added
    }

    pub fn get(&self, message_id: &str) -> Option<&ChatMessage> {
        self.index.get(message_id).map(|&pos| &self.units[pos])
    }

    /// Display units, oldest first.
    pub fn units(&self) -> &[ChatMessage] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Drops the oldest units so at most `limit` remain.
    ///
    /// A dropped id that arrives again starts a new unit.
    pub fn trim_to(&mut self, limit: usize) -> usize {
        if self.units.len() <= limit {
            return 0;
        }
        let removed = self.units.len() - limit;
        self.units.drain(..removed);
        self.index = self
            .units
            .iter()
            .enumerate()
            .map(|(pos, unit)| (unit.message_id.clone(), pos))
            .collect();
        removed
    }

    pub fn clear(&mut self) {
        self.units.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MessageType;

    fn msg(id: &str, text: &str) -> ChatMessage {
        ChatMessage {
            message_id: id.to_string(),
            message_type: MessageType::User,
            speaker_id: "guest".to_string(),
            speaker_name: "Guest".to_string(),
            message: text.to_string(),
            created_at: 0.0,
        }
    }

    #[test]
    fn test_update_keeps_single_unit() {
        let mut acc = TranscriptAccumulator::new();
        assert_eq!(acc.add_message(msg("m1", "hello")), AddOutcome::Added);
        assert_eq!(acc.add_message(msg("m1", "hello world")), AddOutcome::Updated);
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.get("m1").unwrap().message, "hello world");
    }

    #[test]
    fn test_update_keeps_position() {
        let mut acc = TranscriptAccumulator::new();
        acc.add_message(msg("a", "1"));
        acc.add_message(msg("b", "2"));
        acc.add_message(msg("a", "1!"));
        let texts: Vec<_> = acc.units().iter().map(|u| u.message.as_str()).collect();
        assert_eq!(texts, vec!["1!", "2"]);
    }

    #[test]
    fn test_update_does_not_touch_metadata() {
        let mut acc = TranscriptAccumulator::new();
        acc.add_message(msg("a", "1"));
        let mut later = msg("a", "12");
        later.speaker_name = "Someone else".to_string();
        later.created_at = 99.0;
        acc.add_message(later);
        let unit = acc.get("a").unwrap();
        assert_eq!(unit.speaker_name, "Guest");
        assert_eq!(unit.created_at, 0.0);
    }

    #[test]
    fn test_trim_drops_oldest_and_reindexes() {
        let mut acc = TranscriptAccumulator::new();
        for id in ["a", "b", "c", "d"] {
            acc.add_message(msg(id, id));
        }
        assert_eq!(acc.trim_to(2), 2);
        assert!(acc.get("a").is_none());
        assert_eq!(acc.get("d").unwrap().message, "d");

        assert_eq!(acc.add_message(msg("c", "c2")), AddOutcome::Updated);
        assert_eq!(acc.units()[0].message, "c2");
        assert_eq!(acc.add_message(msg("a", "again")), AddOutcome::Added);
        assert_eq!(acc.trim_to(10), 0);
    }
}
