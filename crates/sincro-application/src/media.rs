//! Microphone and camera acquisition.

use std::sync::Arc;

use sincro_core::chat::NoticeSink;
use sincro_core::rtc::{LocalTrack, MediaConstraints, MediaDevices};
use sincro_core::{Result, SincroError};

/// Acquires the local tracks a session needs and reports failures to the user.
pub struct UserMedia {
    devices: Arc<dyn MediaDevices>,
    notices: Arc<dyn NoticeSink>,
    constraints: MediaConstraints,
    audio: Option<Arc<dyn LocalTrack>>,
    video: Option<Arc<dyn LocalTrack>>,
}

impl UserMedia {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        notices: Arc<dyn NoticeSink>,
        constraints: MediaConstraints,
    ) -> Self {
        Self {
            devices,
            notices,
            constraints,
            audio: None,
            video: None,
        }
    }

    pub fn constraints(&self) -> &MediaConstraints {
        &self.constraints
    }

    /// Stops requesting the camera on the next `acquire()`.
    pub fn disable_video(&mut self) {
        self.constraints.disable_video();
    }

    /// Opens the microphone (and the camera, if requested).
    ///
    /// # Returns
    ///
    /// The audio track. A missing microphone is an error and the session
    /// must not start; a missing camera is reported and otherwise ignored.
    pub async fn acquire(&mut self) -> Result<Arc<dyn LocalTrack>> {
        if !self.constraints.audio {
            return Err(SincroError::media("Audio capture is disabled"));
        }

        let audio = match self.devices.open_audio().await {
            Ok(track) => track,
            Err(e) => {
                tracing::error!("[UserMedia] Microphone unavailable: {}", e);
                self.notices
                    .error(&format!("Could not access the microphone.\n{}", e), false);
                return Err(match e {
                    SincroError::Media(_) => e,
                    other => SincroError::media(other.to_string()),
                });
            }
        };
        tracing::info!("[UserMedia] Acquired audio track '{}'", audio.label());
        self.audio = Some(audio.clone());

        if let Some(size) = self.constraints.video {
            match self.devices.open_video(size).await {
                Ok(track) => {
                    tracing::info!("[UserMedia] Acquired video track '{}'", track.label());
                    self.video = Some(track);
                }
                Err(e) => {
                    tracing::warn!("[UserMedia] Camera unavailable: {}", e);
                    self.notices.error(
                        &format!("Could not access the camera. Gaze tracking is off.\n{}", e),
                        false,
                    );
                }
            }
        }

        Ok(audio)
    }

    pub fn audio_track(&self) -> Option<Arc<dyn LocalTrack>> {
        self.audio.clone()
    }

    pub fn video_track(&self) -> Option<Arc<dyn LocalTrack>> {
        self.video.clone()
    }

    /// Stops every acquired track.
    pub fn close(&mut self) {
        for track in self.audio.take().into_iter().chain(self.video.take()) {
            track.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sincro_core::chat::ChatLog;
    use sincro_core::rtc::{TrackKind, VideoSize};
    use std::any::Any;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Track {
        kind: TrackKind,
        stopped: AtomicBool,
    }

    impl LocalTrack for Track {
        fn id(&self) -> &str {
            "t"
        }
        fn kind(&self) -> TrackKind {
            self.kind
        }
        fn label(&self) -> &str {
            "fake"
        }
        fn set_enabled(&self, _enabled: bool) {}
        fn is_enabled(&self) -> bool {
            true
        }
        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
        fn is_stopped(&self) -> bool {
            self.stopped.load(Ordering::SeqCst)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Devices {
        audio: bool,
        video: bool,
    }

    fn track(kind: TrackKind) -> Arc<dyn LocalTrack> {
        Arc::new(Track {
            kind,
            stopped: AtomicBool::new(false),
        })
    }

    #[async_trait]
    impl MediaDevices for Devices {
        async fn open_audio(&self) -> Result<Arc<dyn LocalTrack>> {
            if self.audio {
                Ok(track(TrackKind::Audio))
            } else {
                Err(SincroError::media("no microphone"))
            }
        }

        async fn open_video(&self, _size: VideoSize) -> Result<Arc<dyn LocalTrack>> {
            if self.video {
                Ok(track(TrackKind::Video))
            } else {
                Err(SincroError::media("no camera"))
            }
        }
    }

    fn media(audio: bool, video: bool) -> (Arc<ChatLog>, UserMedia) {
        let log = Arc::new(ChatLog::new(0));
        let media = UserMedia::new(
            Arc::new(Devices { audio, video }),
            log.clone(),
            MediaConstraints::default(),
        );
        (log, media)
    }

    #[tokio::test]
    async fn test_missing_microphone_is_fatal() {
        let (log, mut media) = media(false, true);
        let err = media.acquire().await.err().unwrap();
        assert!(matches!(err, SincroError::Media(_)));
        assert_eq!(log.len(), 1);
        assert!(media.audio_track().is_none());
    }

    #[tokio::test]
    async fn test_missing_camera_is_reported_only() {
        let (log, mut media) = media(true, false);
        let audio = media.acquire().await.unwrap();
        assert_eq!(audio.kind(), TrackKind::Audio);
        assert!(media.video_track().is_none());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_disable_video_skips_camera() {
        let (log, mut media) = media(true, false);
        media.disable_video();
        media.acquire().await.unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_close_stops_tracks() {
        let (_, mut media) = media(true, true);
        let audio = media.acquire().await.unwrap();
        let video = media.video_track().unwrap();
        media.close();
        assert!(audio.is_stopped());
        assert!(video.is_stopped());
        assert!(media.audio_track().is_none());
    }
}
