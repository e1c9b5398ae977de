//! Remote signaling configuration.
//!
//! The configuration is served by the signaling host as JSON
//! (`{ "offerURL": ..., "iceServers": [...] }`) and fetched once per
//! client run. The negotiator reads it through a [`ConfigSlot`], which stays
//! empty until the fetch resolves.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// `urls` may be a single URL or a list, as in the browser `RTCIceServer`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum IceUrls {
    One(String),
    Many(Vec<String>),
}

impl IceUrls {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            IceUrls::One(url) => vec![url.clone()],
            IceUrls::Many(urls) => urls.clone(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: IceUrls,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: IceUrls::One(url.into()),
            username: None,
            credential: None,
        }
    }
}

/// Connection parameters for one talk session.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SignalingConfig {
    #[serde(rename = "offerURL")]
    pub offer_url: String,
    #[serde(rename = "iceServers", default)]
    pub ice_servers: Vec<IceServerConfig>,
}

/// Holder for the resolved [`SignalingConfig`].
///
/// Cloning shares the slot. It is written at most once; later writes are
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct ConfigSlot {
    inner: Arc<OnceLock<SignalingConfig>>,
}

impl ConfigSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a slot that is already resolved.
    pub fn resolved(config: SignalingConfig) -> Self {
        let slot = Self::new();
        slot.resolve(config);
        slot
    }

    /// Stores the configuration. Returns `false` if the slot was already set.
    pub fn resolve(&self, config: SignalingConfig) -> bool {
        self.inner.set(config).is_ok()
    }

    pub fn get(&self) -> Option<&SignalingConfig> {
        self.inner.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_json() {
        let json = r#"{
            "offerURL": "/offer",
            "iceServers": [
                { "urls": "stun:stun.l.google.com:19302" },
                { "urls": ["turn:turn.example.com"], "username": "u", "credential": "c" }
            ]
        }"#;

        let config: SignalingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.offer_url, "/offer");
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(
            config.ice_servers[0].urls.to_vec(),
            vec!["stun:stun.l.google.com:19302".to_string()]
        );
        assert_eq!(config.ice_servers[1].username.as_deref(), Some("u"));
    }

    #[test]
    fn test_missing_ice_servers_defaults_to_empty() {
        let config: SignalingConfig = serde_json::from_str(r#"{"offerURL": "/offer"}"#).unwrap();
        assert!(config.ice_servers.is_empty());
    }

    #[test]
    fn test_slot_resolves_once() {
        let slot = ConfigSlot::new();
        let shared = slot.clone();
        assert!(!slot.is_resolved());

        let first = SignalingConfig {
            offer_url: "/offer".to_string(),
            ice_servers: vec![],
        };
        assert!(shared.resolve(first.clone()));
        assert!(!slot.resolve(SignalingConfig {
            offer_url: "/other".to_string(),
            ice_servers: vec![],
        }));
        assert_eq!(slot.get(), Some(&first));
    }
}
