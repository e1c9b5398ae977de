pub mod chat;
pub mod clock;
pub mod config;
pub mod error;
pub mod reconnect;
pub mod rtc;
pub mod talk;

// Re-export common error type
pub use error::{Result, SincroError};
