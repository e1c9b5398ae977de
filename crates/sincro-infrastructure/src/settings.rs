//! Client settings file (`client.toml`).
//!
//! Every key is optional; missing keys take their defaults. A missing file
//! is the same as an empty one.
//!
//! ```toml
//! config_url = "http://127.0.0.1:8000/api/v1/rtc/config.json"
//! talk_mode = "sincro"
//! close_grace_ms = 1000
//! audio_codec = "opus/48000/2"
//! video_codec = "default"
//! enable_video = false
//! chat_history_limit = 50
//! telop_max_chars = 24
//!
//! [reconnect]
//! base_delay_ms = 10000
//! jitter_ms = 20000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sincro_core::reconnect::ReconnectPolicy;
use sincro_core::rtc::sdp::DEFAULT_CODEC;
use sincro_core::{Result, SincroError};

use crate::paths::SincroPaths;

pub const DEFAULT_CONFIG_URL: &str = "http://127.0.0.1:8000/api/v1/rtc/config.json";
pub const DEFAULT_TALK_MODE: &str = "sincro";

fn default_config_url() -> String {
    DEFAULT_CONFIG_URL.to_string()
}

fn default_talk_mode() -> String {
    DEFAULT_TALK_MODE.to_string()
}

fn default_codec() -> String {
    DEFAULT_CODEC.to_string()
}

fn default_close_grace_ms() -> u64 {
    1000
}

fn default_chat_history_limit() -> usize {
    50
}

fn default_telop_max_chars() -> usize {
    24
}

fn default_base_delay_ms() -> u64 {
    10_000
}

fn default_jitter_ms() -> u64 {
    20_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl ReconnectSettings {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.jitter_ms),
        )
    }
}

/// Local client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Where the signaling configuration JSON is served.
    #[serde(default = "default_config_url")]
    pub config_url: String,
    /// Sent as `talk_mode` with every offer.
    #[serde(default = "default_talk_mode")]
    pub talk_mode: String,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    /// Delay between stopping a session and closing its transport.
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
    /// `rtpmap` codec name to restrict the offer to, or `"default"`.
    #[serde(default = "default_codec")]
    pub audio_codec: String,
    #[serde(default = "default_codec")]
    pub video_codec: String,
    #[serde(default)]
    pub enable_video: bool,
    /// Chat panel size; 0 keeps everything.
    #[serde(default = "default_chat_history_limit")]
    pub chat_history_limit: usize,
    /// Caption line width in characters; 0 disables the caption.
    #[serde(default = "default_telop_max_chars")]
    pub telop_max_chars: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            config_url: default_config_url(),
            talk_mode: default_talk_mode(),
            reconnect: ReconnectSettings::default(),
            close_grace_ms: default_close_grace_ms(),
            audio_codec: default_codec(),
            video_codec: default_codec(),
            enable_video: false,
            chat_history_limit: default_chat_history_limit(),
            telop_max_chars: default_telop_max_chars(),
        }
    }
}

impl ClientSettings {
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

/// Loads and saves [`ClientSettings`] at a fixed path.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Store at the default location (`~/.config/sincro/client.toml`).
    pub fn new() -> Result<Self> {
        let path = SincroPaths::settings_file().map_err(|e| SincroError::config(e.to_string()))?;
        Ok(Self { path })
    }

    /// Store at a custom path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the settings file.
    ///
    /// # Returns
    ///
    /// - `Ok(ClientSettings::default())` if the file does not exist
    /// - `Err(SincroError::Config)` if it exists but cannot be read or parsed
    pub fn load(&self) -> Result<ClientSettings> {
        if !self.path.exists() {
            tracing::debug!(
                "[SettingsStore] {} not found, using defaults",
                self.path.display()
            );
            return Ok(ClientSettings::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            SincroError::config(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let settings: ClientSettings = toml::from_str(&content).map_err(|e| {
            SincroError::config(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;

        tracing::info!("[SettingsStore] Loaded settings from {}", self.path.display());
        Ok(settings)
    }

    /// Writes the settings file, creating parent directories.
    pub fn save(&self, settings: &ClientSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(settings).map_err(|e| SincroError::Serialization {
            format: "TOML".to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
