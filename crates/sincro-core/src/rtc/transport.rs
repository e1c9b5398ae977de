//! Peer connection seam.
//!
//! The negotiator drives a [`PeerTransport`] and never touches a concrete
//! WebRTC stack. Asynchronous notifications (state changes, inbound
//! tracks, data channel traffic) flow back as [`TransportEvent`]s over the
//! channel handed to [`TransportFactory::create`].

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use super::ice::{IceConnectionState, IceGatheringState, SignalingState};
use crate::config::IceServerConfig;
use crate::error::Result;

/// Session description type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Pranswer => "pranswer",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local or remote session description (type + SDP blob).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// Reliability contract of a data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    pub ordered: bool,
    /// `None` = fully reliable.
    pub max_retransmits: Option<u16>,
}

impl ChannelOptions {
    /// Ordered, reliable delivery (the WebRTC default).
    pub fn reliable() -> Self {
        Self {
            ordered: true,
            max_retransmits: None,
        }
    }

    /// Unordered, zero retransmissions.
    pub fn unordered_unreliable() -> Self {
        Self {
            ordered: false,
            max_retransmits: Some(0),
        }
    }
}

/// A locally produced media track attached to the peer connection.
pub trait LocalTrack: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    fn label(&self) -> &str;
    /// Gate media without renegotiating (mute).
    fn set_enabled(&self, enabled: bool);
    fn is_enabled(&self) -> bool;
    /// Permanently ends the track. Idempotent.
    fn stop(&self);
    fn is_stopped(&self) -> bool;
    /// Lets a transport adapter recover its concrete track type.
    fn as_any(&self) -> &dyn Any;
}

/// Inbound media track announced by the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
    pub stream_id: String,
}

/// A data channel created by the local side.
#[async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;
    fn options(&self) -> ChannelOptions;
    /// Closing an already closed or never opened channel is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Notifications from a live transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    IceConnectionState(IceConnectionState),
    IceGatheringState(IceGatheringState),
    SignalingState(SignalingState),
    Track(RemoteTrack),
    ChannelOpen { label: String },
    ChannelClose { label: String },
    ChannelMessage { label: String, data: Bytes },
}

/// What the negotiator needs from a peer connection.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<()>;

    async fn create_data_channel(
        &self,
        label: &str,
        options: ChannelOptions,
    ) -> Result<Arc<dyn DataChannel>>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    /// The local description including every candidate gathered so far.
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Immediate, non-subscribing read of the gathering state.
    fn ice_gathering_state(&self) -> IceGatheringState;

    /// Subscribes to gathering state changes. Dropping the receiver
    /// unsubscribes.
    fn watch_ice_gathering(&self) -> watch::Receiver<IceGatheringState>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Tracks of every outbound sender.
    fn senders(&self) -> Vec<Arc<dyn LocalTrack>>;

    /// Whether [`PeerTransport::stop_transceivers`] does anything.
    fn supports_transceivers(&self) -> bool {
        false
    }

    async fn stop_transceivers(&self) {}

    async fn close(&self) -> Result<()>;
}

/// Builds a brand-new transport per session attempt.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>>;
}

/// Receives inbound remote tracks (the far end's voice).
pub trait PlaybackSink: Send + Sync {
    fn attach(&self, track: RemoteTrack);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_description_json_shape() {
        let json = serde_json::to_value(SessionDescription::offer("v=0")).unwrap();
        assert_eq!(json["type"], "offer");
        assert_eq!(json["sdp"], "v=0");
    }

    #[test]
    fn test_channel_option_presets() {
        let telop = ChannelOptions::unordered_unreliable();
        assert!(!telop.ordered);
        assert_eq!(telop.max_retransmits, Some(0));

        let text = ChannelOptions::reliable();
        assert!(text.ordered);
        assert_eq!(text.max_retransmits, None);
    }
}
