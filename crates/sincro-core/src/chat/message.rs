use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Speaker id used for locally generated notices.
pub const SYSTEM_SPEAKER_ID: &str = "GloriousAI";
/// Display name used for locally generated notices.
pub const SYSTEM_SPEAKER_NAME: &str = "Glorious AI";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    System,
    Error,
    Reset,
    User,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::System => "system",
            MessageType::Error => "error",
            MessageType::Reset => "reset",
            MessageType::User => "user",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transcript channel message, or a locally generated notice.
///
/// Two messages with the same `message_id` are the same logical message;
/// the later one carries the current full text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub message_type: MessageType,
    /// Handle without the leading `@`.
    pub speaker_id: String,
    pub speaker_name: String,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: f64,
}

impl ChatMessage {
    /// Builds a message with a fresh id and the current time.
    pub fn new(
        message_type: MessageType,
        speaker_id: impl Into<String>,
        speaker_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            message_type,
            speaker_id: speaker_id.into(),
            speaker_name: speaker_name.into(),
            message: message.into(),
            created_at: chrono::Utc::now().timestamp_millis() as f64,
        }
    }

    /// A notice attributed to the system speaker.
    pub fn system(message_type: MessageType, message: impl Into<String>) -> Self {
        Self::new(message_type, SYSTEM_SPEAKER_ID, SYSTEM_SPEAKER_NAME, message)
    }

    /// `@speaker_id` as shown next to the display name.
    pub fn handle(&self) -> String {
        format!("@{}", self.speaker_id)
    }
}
