//! Data channel setup and inbound message demultiplexing.

use std::sync::Arc;

use sincro_core::chat::ChatMessage;
use sincro_core::rtc::{
    ChannelOptions, DataChannel, PeerTransport, PlaybackSink, RTC_LOG_TARGET, RemoteTrack,
    TrackKind, TransportEvent,
};
use sincro_core::talk::{MoraEvent, TalkEventHandler};
use sincro_core::{Result, SincroError};

/// Viseme/caption channel: unordered, no retransmissions.
pub const TELOP_CHANNEL: &str = "telop_ch";
/// Transcript channel: ordered, reliable.
pub const TEXT_CHANNEL: &str = "text_ch";

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedMessage {
    Mora(MoraEvent),
    Chat(ChatMessage),
}

/// Creates the two data channels on a transport and routes what arrives on them.
///
/// The router holds no per-session state, so one instance serves every
/// session the negotiator builds.
#[derive(Clone)]
pub struct ChannelRouter {
    handler: Arc<dyn TalkEventHandler>,
    playback: Arc<dyn PlaybackSink>,
}

impl ChannelRouter {
    pub fn new(handler: Arc<dyn TalkEventHandler>, playback: Arc<dyn PlaybackSink>) -> Self {
        Self { handler, playback }
    }

    /// Creates `text_ch` and `telop_ch`. Must run before the offer is created.
    pub async fn open_channels(
        &self,
        transport: &dyn PeerTransport,
    ) -> Result<Vec<Arc<dyn DataChannel>>> {
        let text = transport
            .create_data_channel(TEXT_CHANNEL, ChannelOptions::reliable())
            .await?;
        let telop = transport
            .create_data_channel(TELOP_CHANNEL, ChannelOptions::unordered_unreliable())
            .await?;
        Ok(vec![text, telop])
    }

    /// Handles track and channel events. Returns `false` for events it does not own.
    pub fn dispatch(&self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Track(track) => {
                self.attach_track(track);
                true
            }
            TransportEvent::ChannelOpen { label } => {
                tracing::info!(
                    target: RTC_LOG_TARGET,
                    channel = %label,
                    payload = %format!("- open({})", label),
                    "channel open"
                );
                true
            }
            TransportEvent::ChannelClose { label } => {
                tracing::info!(
                    target: RTC_LOG_TARGET,
                    channel = %label,
                    payload = %format!("- close({})", label),
                    "channel close"
                );
                true
            }
            TransportEvent::ChannelMessage { label, data } => {
                self.on_message(&label, &data);
                true
            }
            _ => false,
        }
    }

    fn attach_track(&self, track: RemoteTrack) {
        match track.kind {
            TrackKind::Audio => {
                tracing::info!("[ChannelRouter] Remote audio track {} attached", track.id);
                self.playback.attach(track);
            }
            TrackKind::Video => {
                tracing::warn!(
                    "[ChannelRouter] Unexpected remote video track {} ignored",
                    track.id
                );
            }
        }
    }

    fn on_message(&self, label: &str, data: &[u8]) {
        let text = String::from_utf8_lossy(data);
        tracing::debug!(
            target: RTC_LOG_TARGET,
            channel = %label,
            payload = %format!("< [{}] {}", label, text),
            "channel message"
        );

        match Self::parse_message(label, data) {
            Ok(RoutedMessage::Mora(event)) => self.handler.on_mora(event),
            Ok(RoutedMessage::Chat(message)) => self.handler.on_chat(message),
            Err(e) => {
                tracing::warn!("[ChannelRouter] Dropped message on {}: {}", label, e);
            }
        }
    }

    /// Parses and shape-checks a payload for the channel it arrived on.
    pub fn parse_message(label: &str, data: &[u8]) -> Result<RoutedMessage> {
        match label {
            TELOP_CHANNEL => {
                let event: MoraEvent = serde_json::from_slice(data)?;
                event.validate()?;
                Ok(RoutedMessage::Mora(event))
            }
            TEXT_CHANNEL => {
                let message: ChatMessage = serde_json::from_slice(data)?;
                Ok(RoutedMessage::Chat(message))
            }
            other => Err(SincroError::transport(format!("Unknown channel '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        moras: Mutex<Vec<MoraEvent>>,
        chats: Mutex<Vec<ChatMessage>>,
        tracks: Mutex<Vec<RemoteTrack>>,
    }

    impl TalkEventHandler for Recorder {
        fn on_mora(&self, event: MoraEvent) {
            self.moras.lock().unwrap().push(event);
        }

        fn on_chat(&self, message: ChatMessage) {
            self.chats.lock().unwrap().push(message);
        }
    }

    impl PlaybackSink for Recorder {
        fn attach(&self, track: RemoteTrack) {
            self.tracks.lock().unwrap().push(track);
        }
    }

    fn router() -> (Arc<Recorder>, ChannelRouter) {
        let recorder = Arc::new(Recorder::default());
        (recorder.clone(), ChannelRouter::new(recorder.clone(), recorder))
    }

    fn message(label: &str, json: &str) -> TransportEvent {
        TransportEvent::ChannelMessage {
            label: label.to_string(),
            data: Bytes::from(json.to_string()),
        }
    }

    #[test]
    fn test_routes_by_channel() {
        let (recorder, router) = router();
        router.dispatch(message(
            TELOP_CHANNEL,
            r#"{"timestamp": 0.1, "message": "今日は", "vowel": "o", "text": "キョ", "length": 0.19, "new_text": true}"#,
        ));
        router.dispatch(message(
            TEXT_CHANNEL,
            r#"{"message_id": "m1", "message_type": "user", "speaker_id": "guest", "speaker_name": "Guest", "message": "hello", "created_at": 0}"#,
        ));
        assert_eq!(recorder.moras.lock().unwrap().len(), 1);
        assert_eq!(recorder.chats.lock().unwrap()[0].message, "hello");
    }

    #[test]
    fn test_malformed_payloads_are_dropped() {
        let (recorder, router) = router();
        router.dispatch(message(TELOP_CHANNEL, "{not json"));
        router.dispatch(message(TELOP_CHANNEL, r#"{"timestamp": 0}"#));
        router.dispatch(message(
            TELOP_CHANNEL,
            r#"{"timestamp": 0, "length": -1, "new_text": true}"#,
        ));
        // A mora on the transcript channel is the wrong shape.
        router.dispatch(message(
            TEXT_CHANNEL,
            r#"{"timestamp": 0, "length": 0.1, "new_text": true}"#,
        ));
        router.dispatch(message("other_ch", "{}"));

        assert!(recorder.moras.lock().unwrap().is_empty());
        assert!(recorder.chats.lock().unwrap().is_empty());
    }

    #[test]
    fn test_audio_tracks_go_to_playback() {
        let (recorder, router) = router();
        router.dispatch(TransportEvent::Track(RemoteTrack {
            id: "a1".to_string(),
            kind: TrackKind::Audio,
            stream_id: "s".to_string(),
        }));
        router.dispatch(TransportEvent::Track(RemoteTrack {
            id: "v1".to_string(),
            kind: TrackKind::Video,
            stream_id: "s".to_string(),
        }));
        let tracks = recorder.tracks.lock().unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, "a1");
    }

    #[test]
    fn test_state_events_are_not_owned() {
        let (_, router) = router();
        assert!(!router.dispatch(TransportEvent::IceConnectionState(
            sincro_core::rtc::IceConnectionState::Checking
        )));
        assert!(router.dispatch(TransportEvent::ChannelOpen {
            label: TEXT_CHANNEL.to_string()
        }));
    }
}
