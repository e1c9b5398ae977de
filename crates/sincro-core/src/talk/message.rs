//! Telop channel wire message.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SincroError};

/// One timed mora (viseme + caption fragment) from the telop channel.
///
/// ```json
/// {"timestamp": 0.1, "message": "今日は", "vowel": "o", "text": "キョ",
///  "length": 0.19575, "new_text": true}
/// ```
///
/// `vowel` and `text` are `null` for the leading silence of an utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoraEvent {
    /// Seconds since the start of the utterance.
    pub timestamp: f64,
    /// Full utterance text being voiced.
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub vowel: Option<String>,
    /// Caption fragment contributed by this mora.
    #[serde(default)]
    pub text: Option<String>,
    /// Seconds this unit stays active.
    pub length: f64,
    /// `false` marks a supplementary emission that must not replace the
    /// active unit.
    pub new_text: bool,
}

impl MoraEvent {
    /// Checks the numeric fields a scheduler relies on.
    pub fn validate(&self) -> Result<()> {
        if !self.length.is_finite() || self.length < 0.0 {
            return Err(SincroError::Serialization {
                format: "JSON".to_string(),
                message: format!("invalid mora length: {}", self.length),
            });
        }
        if !self.timestamp.is_finite() {
            return Err(SincroError::Serialization {
                format: "JSON".to_string(),
                message: format!("invalid mora timestamp: {}", self.timestamp),
            });
        }
        Ok(())
    }

    /// Active duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.length * 1000.0
    }
}
