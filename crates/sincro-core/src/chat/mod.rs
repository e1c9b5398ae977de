//! Chat panel domain: transcript messages and local notices.

mod message;
mod notice;
mod transcript;

pub use message::{ChatMessage, MessageType, SYSTEM_SPEAKER_ID, SYSTEM_SPEAKER_NAME};
pub use notice::{ChatLog, ChatUpdate, NoticeSink};
pub use transcript::{AddOutcome, TranscriptAccumulator};
