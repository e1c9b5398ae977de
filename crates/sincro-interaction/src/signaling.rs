//! HTTP signaling client.
//!
//! Two requests per session:
//!
//! - `GET {config_url}` returns `{ "offerURL": ..., "iceServers": [...] }`
//! - `POST {offerURL}` with `{ "sdp", "type": "offer", "talk_mode" }`
//!   returns the answer description
//!
//! A relative `offerURL` is resolved against the config URL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use sincro_core::config::SignalingConfig;
use sincro_core::rtc::{OfferRequest, SessionDescription, SignalingClient, parse_answer};
use sincro_core::{Result, SincroError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`SignalingClient`] over `reqwest`.
#[derive(Clone)]
pub struct HttpSignalingClient {
    client: Client,
    timeout: Duration,
}

impl HttpSignalingClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Uses a preconfigured `reqwest` client (proxies, TLS roots).
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpSignalingClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalingClient for HttpSignalingClient {
    async fn fetch_config(&self, url: &str) -> Result<SignalingConfig> {
        tracing::info!("[Signaling] Fetching RTC config from {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SincroError::config(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SincroError::config(format!("Failed to read {}: {}", url, e)))?;

        let config = config_from_response(url, status, &body)?;
        tracing::debug!(
            "[Signaling] offerURL={} iceServers={}",
            config.offer_url,
            config.ice_servers.len()
        );
        Ok(config)
    }

    async fn post_offer(&self, url: &str, offer: &OfferRequest) -> Result<SessionDescription> {
        tracing::info!("[Signaling] Posting offer to {}", url);

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(offer)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SincroError::http(format!("Offer request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SincroError::http(format!("Failed to read answer: {}", e)))?;

        answer_from_response(status, &body)
    }
}

/// Parses the config endpoint's response; any failure is a `Config` error.
pub(crate) fn config_from_response(
    url: &str,
    status: StatusCode,
    body: &str,
) -> Result<SignalingConfig> {
    if !status.is_success() {
        return Err(SincroError::config(format!(
            "Failed to fetch {}: {}",
            url, status
        )));
    }
    let mut config: SignalingConfig = serde_json::from_str(body)
        .map_err(|e| SincroError::config(format!("Invalid RTC config: {}", e)))?;
    config.offer_url = resolve_offer_url(url, &config.offer_url)?;
    Ok(config)
}

/// Maps the offer endpoint's response to an answer or a typed error.
pub(crate) fn answer_from_response(status: StatusCode, body: &str) -> Result<SessionDescription> {
    let status_text = status.canonical_reason().unwrap_or("").to_string();
    match status {
        StatusCode::OK => parse_answer(body),
        StatusCode::TOO_MANY_REQUESTS => {
            tracing::warn!("[Signaling] Offer rejected: 429 {}", status_text);
            Err(SincroError::RateLimited { status_text })
        }
        other => {
            tracing::warn!("[Signaling] Unexpected offer response: {}", other);
            Err(SincroError::UnexpectedStatus {
                status: other.as_u16(),
                status_text,
            })
        }
    }
}

/// Resolves `offer_url` against the URL the config was fetched from.
pub(crate) fn resolve_offer_url(config_url: &str, offer_url: &str) -> Result<String> {
    let base = Url::parse(config_url)
        .map_err(|e| SincroError::config(format!("Invalid config URL {}: {}", config_url, e)))?;
    let resolved = base
        .join(offer_url)
        .map_err(|e| SincroError::config(format!("Invalid offerURL {}: {}", offer_url, e)))?;
    Ok(resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_parses_answer() {
        let answer =
            answer_from_response(StatusCode::OK, r#"{"type": "answer", "sdp": "v=0\r\n"}"#)
                .unwrap();
        assert_eq!(answer.sdp, "v=0\r\n");
    }

    #[test]
    fn test_429_is_rate_limited() {
        let err = answer_from_response(StatusCode::TOO_MANY_REQUESTS, "").unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(err.to_string(), "Too many requests - 429 Too Many Requests");
    }

    #[test]
    fn test_other_status_is_unexpected() {
        let err = answer_from_response(StatusCode::SERVICE_UNAVAILABLE, "busy").unwrap_err();
        match err {
            SincroError::UnexpectedStatus {
                status,
                status_text,
            } => {
                assert_eq!(status, 503);
                assert_eq!(status_text, "Service Unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // 201 is not an answer either.
        assert!(answer_from_response(StatusCode::CREATED, "{}").is_err());
    }

    #[test]
    fn test_ok_with_malformed_body() {
        let err = answer_from_response(StatusCode::OK, r#"{"type": "answer"}"#).unwrap_err();
        assert!(matches!(err, SincroError::MalformedAnswer(_)));
    }

    #[test]
    fn test_resolve_offer_url() {
        let config = "http://127.0.0.1:8000/api/v1/rtc/config.json";
        assert_eq!(
            resolve_offer_url(config, "/offer").unwrap(),
            "http://127.0.0.1:8000/offer"
        );
        assert_eq!(
            resolve_offer_url(config, "https://rtc.example.net/api/v1/rtc/offer").unwrap(),
            "https://rtc.example.net/api/v1/rtc/offer"
        );
        assert!(resolve_offer_url("not a url", "/offer").unwrap_err().is_config());
    }

    const CONFIG_URL: &str = "http://127.0.0.1:8000/api/v1/rtc/config.json";

    #[test]
    fn test_config_response_resolves_offer_url() {
        let body = r#"{"offerURL": "/offer", "iceServers": [{"urls": ["stun:stun.l.google.com:19302"]}]}"#;
        let config = config_from_response(CONFIG_URL, StatusCode::OK, body).unwrap();
        assert_eq!(config.offer_url, "http://127.0.0.1:8000/offer");
        assert_eq!(config.ice_servers.len(), 1);
    }

    #[test]
    fn test_config_error_status_is_config_error() {
        let err = config_from_response(CONFIG_URL, StatusCode::NOT_FOUND, "").unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_config_invalid_json_is_config_error() {
        let err = config_from_response(CONFIG_URL, StatusCode::OK, "<html>").unwrap_err();
        assert!(err.is_config());
    }

    fn loopback_client() -> HttpSignalingClient {
        let client = Client::builder().no_proxy().build().unwrap();
        HttpSignalingClient::with_client(client).with_timeout(Duration::from_secs(5))
    }

    /// Answers one HTTP request on a loopback port with `response`.
    async fn serve_once(response: String) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/api/v1/rtc/config.json", addr)
    }

    #[tokio::test]
    async fn test_fetch_config_over_http() {
        let body = r#"{"offerURL": "/offer", "iceServers": []}"#;
        let url = serve_once(format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ))
        .await;

        let client = loopback_client();
        let config = client.fetch_config(&url).await.unwrap();
        assert!(config.offer_url.ends_with("/offer"));
        assert!(config.offer_url.starts_with("http://127.0.0.1:"));
    }

    #[tokio::test]
    async fn test_fetch_config_not_found_is_config_error() {
        let url = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
        )
        .await;

        let client = loopback_client();
        let err = client.fetch_config(&url).await.unwrap_err();
        assert!(err.is_config());
    }
}
