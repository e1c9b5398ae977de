//! Speech output: mora timing, captions and mouth shapes.

mod handler;
mod message;
mod mora;
mod telop;
mod viseme;

pub use handler::TalkEventHandler;
pub use message::MoraEvent;
pub use mora::{ActiveMoraUnit, DEFAULT_HISTORY_CAPACITY, MoraScheduler};
pub use telop::{SILENCE_FRAGMENT, TelopLine};
pub use viseme::{MouthWeights, VisemeTracker, Vowel, envelope};
