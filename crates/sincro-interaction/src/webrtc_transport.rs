//! [`PeerTransport`] backed by `webrtc-rs`.
//!
//! Every `RTCPeerConnection` / `RTCDataChannel` callback is turned into a
//! [`TransportEvent`] on the channel handed to the factory, so the
//! negotiator and router see a single ordered event stream per session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sincro_core::config::IceServerConfig;
use sincro_core::rtc::{
    ChannelOptions, DataChannel, IceConnectionState, IceGatheringState, LocalTrack, PeerTransport,
    RemoteTrack, SdpType, SessionDescription, SignalingState, TrackKind, TransportEvent,
    TransportFactory,
};
use sincro_core::{Result, SincroError};
use tokio::sync::{mpsc, watch};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::media::SampleTrack;

fn transport_error(context: &str, err: impl std::fmt::Display) -> SincroError {
    SincroError::transport(format!("{}: {}", context, err))
}

/// Builds peer connections with the default codecs and interceptors.
pub struct WebRtcTransportFactory {
    api: API,
}

impl WebRtcTransportFactory {
    pub fn new() -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| transport_error("Failed to register codecs", e))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| transport_error("Failed to register interceptors", e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        Ok(Self { api })
    }
}

fn to_rtc_ice_servers(servers: &[IceServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|server| RTCIceServer {
            urls: server.urls.to_vec(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>> {
        let config = RTCConfiguration {
            ice_servers: to_rtc_ice_servers(ice_servers),
            ..Default::default()
        };
        let pc = Arc::new(
            self.api
                .new_peer_connection(config)
                .await
                .map_err(|e| transport_error("Failed to create peer connection", e))?,
        );

        let transport = WebRtcTransport::new(pc, events);
        transport.install_handlers();
        tracing::debug!(
            "[WebRtcTransport] Peer connection created with {} ICE server(s)",
            ice_servers.len()
        );
        Ok(Arc::new(transport))
    }
}

pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    events: mpsc::UnboundedSender<TransportEvent>,
    gathering: Arc<watch::Sender<IceGatheringState>>,
    senders: Mutex<Vec<Arc<dyn LocalTrack>>>,
}

impl WebRtcTransport {
    fn new(pc: Arc<RTCPeerConnection>, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        let (gathering, _) = watch::channel(IceGatheringState::New);
        Self {
            pc,
            events,
            gathering: Arc::new(gathering),
            senders: Mutex::new(Vec::new()),
        }
    }

    fn install_handlers(&self) {
        let events = self.events.clone();
        self.pc
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                if let Some(state) = map_ice_connection_state(state) {
                    let _ = events.send(TransportEvent::IceConnectionState(state));
                }
                Box::pin(async {})
            }));

        let events = self.events.clone();
        self.pc
            .on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
                if let Some(state) = map_signaling_state(state) {
                    let _ = events.send(TransportEvent::SignalingState(state));
                }
                Box::pin(async {})
            }));

        // The end-of-candidates callback (None) is the reliable completion signal.
        let events = self.events.clone();
        let gathering = self.gathering.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let next = if candidate.is_some() {
                    IceGatheringState::Gathering
                } else {
                    IceGatheringState::Complete
                };
                let changed = gathering.send_if_modified(|current| {
                    if *current == next {
                        false
                    } else {
                        *current = next;
                        true
                    }
                });
                if changed {
                    let _ = events.send(TransportEvent::IceGatheringState(next));
                }
                Box::pin(async {})
            }));

        let events = self.events.clone();
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let events = events.clone();
                Box::pin(async move {
                    let kind = match track.kind() {
                        RTPCodecType::Audio => TrackKind::Audio,
                        RTPCodecType::Video => TrackKind::Video,
                        _ => {
                            tracing::warn!("[WebRtcTransport] Track with unspecified kind ignored");
                            return;
                        }
                    };
                    let _ = events.send(TransportEvent::Track(RemoteTrack {
                        id: track.id(),
                        kind,
                        stream_id: track.stream_id(),
                    }));
                    // Drain RTP so the receiver's buffers never fill up.
                    tokio::spawn(async move { while track.read_rtp().await.is_ok() {} });
                })
            },
        ));
    }

    fn wire_channel(&self, channel: &Arc<RTCDataChannel>, label: &str) {
        let events = self.events.clone();
        let open_label = label.to_string();
        channel.on_open(Box::new(move || {
            let _ = events.send(TransportEvent::ChannelOpen {
                label: open_label.clone(),
            });
            Box::pin(async {})
        }));

        let events = self.events.clone();
        let close_label = label.to_string();
        channel.on_close(Box::new(move || {
            let _ = events.send(TransportEvent::ChannelClose {
                label: close_label.clone(),
            });
            Box::pin(async {})
        }));

        let events = self.events.clone();
        let message_label = label.to_string();
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let _ = events.send(TransportEvent::ChannelMessage {
                label: message_label.clone(),
                data: msg.data,
            });
            Box::pin(async {})
        }));
    }
}

fn map_ice_connection_state(state: RTCIceConnectionState) -> Option<IceConnectionState> {
    match state {
        RTCIceConnectionState::New => Some(IceConnectionState::New),
        RTCIceConnectionState::Checking => Some(IceConnectionState::Checking),
        RTCIceConnectionState::Connected => Some(IceConnectionState::Connected),
        RTCIceConnectionState::Completed => Some(IceConnectionState::Completed),
        RTCIceConnectionState::Disconnected => Some(IceConnectionState::Disconnected),
        RTCIceConnectionState::Failed => Some(IceConnectionState::Failed),
        RTCIceConnectionState::Closed => Some(IceConnectionState::Closed),
        _ => None,
    }
}

fn map_signaling_state(state: RTCSignalingState) -> Option<SignalingState> {
    match state {
        RTCSignalingState::Stable => Some(SignalingState::Stable),
        RTCSignalingState::HaveLocalOffer => Some(SignalingState::HaveLocalOffer),
        RTCSignalingState::HaveRemoteOffer => Some(SignalingState::HaveRemoteOffer),
        RTCSignalingState::HaveLocalPranswer => Some(SignalingState::HaveLocalPranswer),
        RTCSignalingState::HaveRemotePranswer => Some(SignalingState::HaveRemotePranswer),
        RTCSignalingState::Closed => Some(SignalingState::Closed),
        _ => None,
    }
}

fn from_rtc_description(desc: RTCSessionDescription) -> Option<SessionDescription> {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        _ => return None,
    };
    Some(SessionDescription {
        sdp_type,
        sdp: desc.sdp,
    })
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let converted = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp),
        SdpType::Rollback => {
            return Err(SincroError::transport("Rollback descriptions are not supported"));
        }
    };
    converted.map_err(|e| transport_error("Invalid session description", e))
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<()> {
        let sample = SampleTrack::from_local(track.as_ref()).ok_or_else(|| {
            SincroError::transport(format!("Unsupported local track '{}'", track.label()))
        })?;
        let inner: Arc<dyn TrackLocal + Send + Sync> = sample.inner();
        let sender = self
            .pc
            .add_track(inner)
            .await
            .map_err(|e| transport_error("Failed to add track", e))?;

        // RTCP has to be read for the interceptors to run.
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        self.senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(track);
        Ok(())
    }

    async fn create_data_channel(
        &self,
        label: &str,
        options: ChannelOptions,
    ) -> Result<Arc<dyn DataChannel>> {
        let init = RTCDataChannelInit {
            ordered: Some(options.ordered),
            max_retransmits: options.max_retransmits,
            ..Default::default()
        };
        let channel = self
            .pc
            .create_data_channel(label, Some(init))
            .await
            .map_err(|e| transport_error("Failed to create data channel", e))?;
        self.wire_channel(&channel, label);

        Ok(Arc::new(WebRtcDataChannel {
            label: label.to_string(),
            options,
            inner: channel,
            closed: AtomicBool::new(false),
        }))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| transport_error("Failed to create offer", e))?;
        from_rtc_description(offer).ok_or(SincroError::NullLocalDescription)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(|e| transport_error("Failed to set local description", e))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc
            .local_description()
            .await
            .and_then(from_rtc_description)
    }

    fn ice_gathering_state(&self) -> IceGatheringState {
        *self.gathering.borrow()
    }

    fn watch_ice_gathering(&self) -> watch::Receiver<IceGatheringState> {
        self.gathering.subscribe()
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| transport_error("Failed to set remote description", e))
    }

    fn senders(&self) -> Vec<Arc<dyn LocalTrack>> {
        self.senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn supports_transceivers(&self) -> bool {
        true
    }

    async fn stop_transceivers(&self) {
        for transceiver in self.pc.get_transceivers().await {
            if let Err(e) = transceiver.stop().await {
                tracing::debug!("[WebRtcTransport] Transceiver stop failed: {}", e);
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| transport_error("Failed to close peer connection", e))
    }
}

pub struct WebRtcDataChannel {
    label: String,
    options: ChannelOptions,
    inner: Arc<RTCDataChannel>,
    closed: AtomicBool,
}

#[async_trait]
impl DataChannel for WebRtcDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn options(&self) -> ChannelOptions {
        self.options
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner
            .close()
            .await
            .map_err(|e| transport_error("Failed to close data channel", e))
    }
}
