//! Local capture device seam.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::transport::LocalTrack;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

impl Default for VideoSize {
    /// 320x240, enough for gaze estimation.
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
        }
    }
}

/// What to request from the capture devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    /// `None` means no camera.
    pub video: Option<VideoSize>,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: Some(VideoSize::default()),
        }
    }
}

impl MediaConstraints {
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: None,
        }
    }

    pub fn disable_video(&mut self) {
        self.video = None;
    }
}

/// Capture device access.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn open_audio(&self) -> Result<Arc<dyn LocalTrack>>;

    async fn open_video(&self, size: VideoSize) -> Result<Arc<dyn LocalTrack>>;
}
