//! Error types for the Sincro client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the entire Sincro client.
///
/// Runtime failures (network, signaling, malformed payloads) are converted
/// into one of these variants at the boundary of each async operation and
/// then turned into a scheduled reconnect and/or a user-visible notice.
/// Only precondition violations (`ConfigNotResolved`, `AlreadyStarted`)
/// are returned across the public negotiator API.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum SincroError {
    /// Remote signaling configuration could not be fetched or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// `start()` was called before the signaling configuration resolved
    #[error("Signaling configuration has not been resolved yet")]
    ConfigNotResolved,

    /// `start()` was called while a session is already live
    #[error("A talk session is already running")]
    AlreadyStarted,

    /// Camera or microphone could not be acquired
    #[error("Media acquisition error: {0}")]
    Media(String),

    /// Peer connection / data channel failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The transport produced no local description after gathering
    #[error("Offer is null")]
    NullLocalDescription,

    /// Signaling endpoint answered 429
    #[error("Too many requests - 429 {status_text}")]
    RateLimited { status_text: String },

    /// Signaling endpoint answered something other than 200 / 429
    #[error("Invalid response - {status} {status_text}")]
    UnexpectedStatus { status: u16, status_text: String },

    /// The answer body parsed but is not a usable answer description
    #[error("Malformed answer: {0}")]
    MalformedAnswer(String),

    /// HTTP transport failure (connection refused, timeout, ...)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },
}

impl SincroError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a Media error
    pub fn media(message: impl Into<String>) -> Self {
        Self::Media(message.into())
    }

    /// Creates a Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates an Http error
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http(message.into())
    }

    /// Creates a MalformedAnswer error
    pub fn malformed_answer(message: impl Into<String>) -> Self {
        Self::MalformedAnswer(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a rate-limit rejection from the signaling endpoint
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if this is a config error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::ConfigNotResolved)
    }

    /// Text shown on the user-visible error surface for a failed negotiation.
    ///
    /// Rate limiting gets its own wording; everything else shares the
    /// generic connection-failure text with the error detail appended.
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimited { .. } => {
                "The speech server is busy. Retrying shortly...".to_string()
            }
            other => format!("Failed to connect to the RTC server...\n{}", other),
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for SincroError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for SincroError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for SincroError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, SincroError>`.
pub type Result<T> = std::result::Result<T, SincroError>;
