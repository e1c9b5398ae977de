//! Application layer for Sincro.
//!
//! This crate wires the core seams together: the peer negotiator that owns
//! session lifecycle and recovery, the channel router that turns inbound
//! payloads into typed events, the talk manager that consumes them, and
//! media acquisition.

pub mod media;
pub mod negotiator;
pub mod router;
pub mod talk;

pub use media::UserMedia;
pub use negotiator::{NegotiationOutcome, NegotiatorOptions, PeerNegotiator, ice_notice};
pub use router::{ChannelRouter, RoutedMessage, TELOP_CHANNEL, TEXT_CHANNEL};
pub use talk::TalkManager;
