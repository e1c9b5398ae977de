pub mod media;
pub mod signaling;
pub mod webrtc_transport;

pub use crate::media::{SampleTrack, SampleTrackDevices, spawn_silence_feeder};
pub use crate::signaling::HttpSignalingClient;
pub use crate::webrtc_transport::{WebRtcDataChannel, WebRtcTransport, WebRtcTransportFactory};
