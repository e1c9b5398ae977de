use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sincro_application::{
    ChannelRouter, NegotiationOutcome, NegotiatorOptions, PeerNegotiator, TalkManager, UserMedia,
};
use sincro_console::{DebugConsole, RtcDebugEvent};
use sincro_core::chat::{AddOutcome, ChatLog, ChatUpdate};
use sincro_core::config::ConfigSlot;
use sincro_core::rtc::{LocalTrack, MediaConstraints, PlaybackSink, RemoteTrack, SignalingClient};
use sincro_core::talk::{MoraScheduler, VisemeTracker};
use sincro_infrastructure::{ClientSettings, SettingsStore};
use sincro_interaction::{
    HttpSignalingClient, SampleTrackDevices, WebRtcTransportFactory, spawn_silence_feeder,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Render tick; mouth state is sampled at display rate.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

pub struct TalkArgs {
    pub settings: Option<PathBuf>,
    pub config_url: Option<String>,
    pub mode: Option<String>,
    pub video: bool,
}

/// Remote audio has no local output device here; tracks are only logged.
struct LoggingPlayback;

impl PlaybackSink for LoggingPlayback {
    fn attach(&self, track: RemoteTrack) {
        tracing::info!(
            "[Playback] Remote {} track {} (stream {})",
            track.kind,
            track.id,
            track.stream_id
        );
    }
}

fn load_settings(args: &TalkArgs) -> Result<ClientSettings> {
    let store = match &args.settings {
        Some(path) => SettingsStore::with_path(path),
        None => SettingsStore::new()?,
    };
    let mut settings = store.load()?;

    if let Some(url) = &args.config_url {
        settings.config_url = url.clone();
    }
    if let Some(mode) = &args.mode {
        settings.talk_mode = mode.clone();
    }
    if args.video {
        settings.enable_video = true;
    }
    Ok(settings)
}

fn negotiator_options(settings: &ClientSettings) -> NegotiatorOptions {
    NegotiatorOptions {
        talk_mode: Some(settings.talk_mode.clone()).filter(|mode| !mode.is_empty()),
        reconnect: settings.reconnect.policy(),
        close_grace: settings.close_grace(),
        audio_codec: settings.audio_codec.clone(),
        video_codec: settings.video_codec.clone(),
    }
}

/// Opens the microphone. Without one there is no session to run, but the
/// chat and console keep going; the failure is already on the error surface.
async fn acquire_microphone(media: &mut UserMedia) -> Option<Arc<dyn LocalTrack>> {
    match media.acquire().await {
        Ok(audio) => Some(audio),
        Err(e) => {
            tracing::warn!("[Talk] Running without a session: {}", e);
            None
        }
    }
}

/// A negotiator with its outbound audio pump.
struct LiveSession {
    negotiator: PeerNegotiator,
    feeder: Option<JoinHandle<()>>,
}

impl LiveSession {
    async fn stop(self) {
        self.negotiator.stop().await;
        if let Some(feeder) = self.feeder {
            feeder.abort();
        }
    }
}

fn print_chat(update: &ChatUpdate) {
    let message = &update.message;
    let marker = match update.outcome {
        AddOutcome::Added => "",
        AddOutcome::Updated => " (updated)",
    };
    println!(
        "[{}] {} {}: {}{}",
        message.message_type,
        message.speaker_name,
        message.handle(),
        message.message,
        marker
    );
}

pub async fn run(
    args: TalkArgs,
    mut debug_events: Option<mpsc::UnboundedReceiver<RtcDebugEvent>>,
) -> Result<()> {
    let settings = load_settings(&args)?;

    let chat = Arc::new(ChatLog::new(settings.chat_history_limit));
    let mut chat_updates = chat.subscribe();

    let signaling = Arc::new(HttpSignalingClient::new());
    let config = match signaling.fetch_config(&settings.config_url).await {
        Ok(config) => config,
        Err(e) => {
            chat.write_error_message(&e.to_string(), true);
            return Err(e).context("Could not load the RTC configuration");
        }
    };
    tracing::info!(
        "[Talk] Offer endpoint {} with {} ICE server(s)",
        config.offer_url,
        config.ice_servers.len()
    );

    let mut devices = SampleTrackDevices::new();
    let mut constraints = MediaConstraints::default();
    if settings.enable_video {
        devices = devices.with_video();
    } else {
        constraints.disable_video();
    }
    let mut media = UserMedia::new(Arc::new(devices), chat.clone(), constraints);

    let scheduler = Arc::new(MoraScheduler::new());
    let talk = Arc::new(TalkManager::new(
        scheduler.clone(),
        chat.clone(),
        settings.telop_max_chars,
    ));

    let session = match acquire_microphone(&mut media).await {
        Some(audio) => {
            let feeder = spawn_silence_feeder(audio.clone());
            let router = ChannelRouter::new(talk.clone(), Arc::new(LoggingPlayback));
            let negotiator = PeerNegotiator::new(
                Arc::new(WebRtcTransportFactory::new()?),
                signaling,
                chat.clone(),
                ConfigSlot::resolved(config),
                router,
                negotiator_options(&settings),
            );

            match negotiator.start(audio).await? {
                NegotiationOutcome::Connected => {
                    tracing::info!("[Talk] Negotiated, waiting for ICE")
                }
                NegotiationOutcome::Failed { reconnect_in } => {
                    tracing::warn!("[Talk] Retrying in {:.1}s", reconnect_in.as_secs_f64())
                }
                NegotiationOutcome::Superseded => {}
            }
            Some(LiveSession { negotiator, feeder })
        }
        None => None,
    };

    let mut console = DebugConsole::new();
    let mut viseme = VisemeTracker::new();
    let mut last_caption = String::new();
    let mut frames = tokio::time::interval(FRAME_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                tracing::info!("[Talk] Stopping");
                break;
            }
            _ = frames.tick() => {
                let previous = viseme.last_unit_id();
                let weights = viseme.poll(&scheduler);
                if viseme.last_unit_id() != previous {
                    if let Some(unit) = talk.current_unit() {
                        println!(
                            "[mouth] unit {} vowel {} a={:.2} i={:.2} u={:.2} e={:.2} o={:.2}",
                            unit.unit_id,
                            unit.event.vowel.as_deref().unwrap_or("-"),
                            weights.a,
                            weights.i,
                            weights.u,
                            weights.e,
                            weights.o
                        );
                    }
                }
                let caption = talk.telop_text();
                if caption != last_caption {
                    println!("[caption] {}", caption);
                    last_caption = caption;
                }
            }
            update = chat_updates.recv() => match update {
                Ok(update) => print_chat(&update),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("[Talk] Chat display skipped {} update(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            Some(event) = async {
                match debug_events.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                if console.apply(&event) && event.field("channel").is_none() {
                    eprintln!("{}", console.render());
                }
            }
        }
    }

    let stopped_session = session.is_some();
    if let Some(session) = session {
        session.stop().await;
    }
    media.close();
    if stopped_session {
        // Let the delayed transport close run before the runtime shuts down.
        tokio::time::sleep(settings.close_grace() + Duration::from_millis(100)).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sincro_core::chat::MessageType;
    use sincro_core::rtc::{MediaDevices, VideoSize};
    use sincro_core::{Result as SincroResult, SincroError};

    struct NoDevices;

    #[async_trait]
    impl MediaDevices for NoDevices {
        async fn open_audio(&self) -> SincroResult<Arc<dyn LocalTrack>> {
            Err(SincroError::media("no capture device"))
        }

        async fn open_video(&self, _size: VideoSize) -> SincroResult<Arc<dyn LocalTrack>> {
            Err(SincroError::media("no capture device"))
        }
    }

    #[tokio::test]
    async fn test_missing_microphone_keeps_running_without_session() {
        let chat = Arc::new(ChatLog::new(0));
        let mut media = UserMedia::new(
            Arc::new(NoDevices),
            chat.clone(),
            MediaConstraints::audio_only(),
        );

        assert!(acquire_microphone(&mut media).await.is_none());

        let errors: Vec<_> = chat
            .messages()
            .into_iter()
            .filter(|m| m.message_type == MessageType::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("Could not access the microphone."));
    }

    #[tokio::test]
    async fn test_microphone_is_acquired_from_sample_devices() {
        let chat = Arc::new(ChatLog::new(0));
        let mut media = UserMedia::new(
            Arc::new(SampleTrackDevices::new()),
            chat.clone(),
            MediaConstraints::audio_only(),
        );

        let audio = acquire_microphone(&mut media).await.unwrap();
        assert!(!audio.is_stopped());
        media.close();
        assert!(audio.is_stopped());
    }

    #[test]
    fn test_flags_override_settings_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("client.toml");
        std::fs::write(&path, "talk_mode = \"chat\"\nenable_video = false\n").unwrap();

        let args = TalkArgs {
            settings: Some(path.clone()),
            config_url: Some("http://localhost:9000/config.json".to_string()),
            mode: None,
            video: true,
        };
        let settings = load_settings(&args).unwrap();
        assert_eq!(settings.talk_mode, "chat");
        assert_eq!(settings.config_url, "http://localhost:9000/config.json");
        assert!(settings.enable_video);
    }

    #[test]
    fn test_empty_mode_omits_talk_mode() {
        let settings = ClientSettings {
            talk_mode: String::new(),
            ..ClientSettings::default()
        };
        assert_eq!(negotiator_options(&settings).talk_mode, None);
        assert_eq!(
            negotiator_options(&ClientSettings::default()).talk_mode.as_deref(),
            Some("sincro")
        );
    }
}
