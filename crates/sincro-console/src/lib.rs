//! Connection diagnostics for Sincro.
//!
//! [`RtcEventLayer`] is installed in the process subscriber and forwards the
//! `sincro::rtc` events; [`DebugConsole`] folds them into what a developer
//! wants to see while a session is running.

pub mod console;
pub mod tracing_layer;

pub use console::{CHANNEL_LOG_LINES, DebugConsole, StateHistory};
pub use tracing_layer::{RtcDebugEvent, RtcEventLayer};
