//! Real-time transport domain module.
//!
//! # Module Structure
//!
//! - `ice`: ICE connection / gathering / signaling state enums
//! - `transport`: the peer connection seam (`PeerTransport`, `TransportFactory`, events)
//! - `media`: capture devices and constraints
//! - `signaling`: offer/answer HTTP exchange (`SignalingClient`, `OfferRequest`)
//! - `sdp`: codec filtering of outgoing offers

mod ice;
mod media;
mod signaling;
mod transport;

pub mod sdp;

/// `tracing` target for connection diagnostics (state changes, SDP, channel
/// traffic). The debug console subscribes to this target.
pub const RTC_LOG_TARGET: &str = "sincro::rtc";

pub use ice::{IceConnectionState, IceGatheringState, SignalingState};
pub use media::{MediaConstraints, MediaDevices, VideoSize};
pub use signaling::{OfferRequest, SignalingClient, parse_answer};
pub use transport::{
    ChannelOptions, DataChannel, LocalTrack, PeerTransport, PlaybackSink, RemoteTrack, SdpType,
    SessionDescription, TrackKind, TransportEvent, TransportFactory,
};
