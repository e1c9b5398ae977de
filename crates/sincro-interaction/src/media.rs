//! Local tracks backed by `webrtc` static-sample tracks.
//!
//! There is no capture backend here: the caller pushes encoded samples with
//! [`SampleTrack::write_sample`]. Samples written while the track is
//! disabled (muted) or stopped are dropped.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sincro_core::rtc::{LocalTrack, MediaDevices, TrackKind, VideoSize};
use sincro_core::{Result, SincroError};
use tokio::task::JoinHandle;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// One 20 ms Opus frame of silence.
pub const OPUS_SILENCE_FRAME: [u8; 3] = [0xF8, 0xFF, 0xFE];
pub const OPUS_FRAME_DURATION: Duration = Duration::from_millis(20);

const STREAM_ID: &str = "sincro";

pub struct SampleTrack {
    id: String,
    kind: TrackKind,
    label: String,
    inner: Arc<TrackLocalStaticSample>,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl SampleTrack {
    pub fn audio(label: impl Into<String>) -> Self {
        let capability = RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_string(),
            clock_rate: 48_000,
            channels: 2,
            ..Default::default()
        };
        Self::with_capability(TrackKind::Audio, "audio", label, capability)
    }

    pub fn video(label: impl Into<String>) -> Self {
        let capability = RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_string(),
            clock_rate: 90_000,
            ..Default::default()
        };
        Self::with_capability(TrackKind::Video, "video", label, capability)
    }

    fn with_capability(
        kind: TrackKind,
        id: &str,
        label: impl Into<String>,
        capability: RTCRtpCodecCapability,
    ) -> Self {
        let inner = Arc::new(TrackLocalStaticSample::new(
            capability,
            id.to_string(),
            STREAM_ID.to_string(),
        ));
        Self {
            id: id.to_string(),
            kind,
            label: label.into(),
            inner,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    /// The underlying `webrtc` track, for `RTCPeerConnection::add_track`.
    pub fn inner(&self) -> Arc<TrackLocalStaticSample> {
        self.inner.clone()
    }

    /// Recovers the concrete track from a trait object.
    pub fn from_local(track: &dyn LocalTrack) -> Option<&SampleTrack> {
        track.as_any().downcast_ref::<SampleTrack>()
    }

    /// Writes one encoded frame.
    ///
    /// # Returns
    ///
    /// `Ok(false)` if the frame was dropped because the track is muted or stopped.
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<bool> {
        if self.is_stopped() || !self.is_enabled() {
            return Ok(false);
        }
        let sample = Sample {
            data,
            duration,
            ..Default::default()
        };
        self.inner
            .write_sample(&sample)
            .await
            .map_err(|e| SincroError::media(format!("Failed to write sample: {}", e)))?;
        Ok(true)
    }
}

impl LocalTrack for SampleTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("[SampleTrack] Stopped {} track '{}'", self.kind, self.label);
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Feeds Opus silence into `track` every 20 ms until it is stopped.
///
/// Returns `None` if `track` is not a [`SampleTrack`] audio track.
pub fn spawn_silence_feeder(track: Arc<dyn LocalTrack>) -> Option<JoinHandle<()>> {
    let sample = SampleTrack::from_local(track.as_ref())?;
    if sample.kind != TrackKind::Audio {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(OPUS_FRAME_DURATION);
        while !track.is_stopped() {
            ticker.tick().await;
            let Some(sample) = SampleTrack::from_local(track.as_ref()) else {
                break;
            };
            if let Err(e) = sample
                .write_sample(Bytes::from_static(&OPUS_SILENCE_FRAME), OPUS_FRAME_DURATION)
                .await
            {
                tracing::debug!("[SampleTrack] Silence feeder stopped: {}", e);
                break;
            }
        }
    }))
}

/// [`MediaDevices`] that hands out [`SampleTrack`]s.
#[derive(Debug, Clone, Default)]
pub struct SampleTrackDevices {
    video_available: bool,
}

impl SampleTrackDevices {
    /// Audio only; video requests fail like a missing camera.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(mut self) -> Self {
        self.video_available = true;
        self
    }
}

#[async_trait]
impl MediaDevices for SampleTrackDevices {
    async fn open_audio(&self) -> Result<Arc<dyn LocalTrack>> {
        Ok(Arc::new(SampleTrack::audio("sample-microphone")))
    }

    async fn open_video(&self, size: VideoSize) -> Result<Arc<dyn LocalTrack>> {
        if !self.video_available {
            return Err(SincroError::media("No video device available"));
        }
        Ok(Arc::new(SampleTrack::video(format!(
            "sample-camera {}x{}",
            size.width, size.height
        ))))
    }
}
