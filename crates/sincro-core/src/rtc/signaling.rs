//! Offer/answer exchange with the signaling host.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::transport::{SdpType, SessionDescription};
use crate::config::SignalingConfig;
use crate::error::{Result, SincroError};

/// Body of `POST {offerURL}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRequest {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub talk_mode: Option<String>,
}

impl OfferRequest {
    pub fn new(offer: SessionDescription, talk_mode: Option<String>) -> Self {
        Self {
            sdp: offer.sdp,
            sdp_type: offer.sdp_type,
            talk_mode,
        }
    }
}

/// Loose view of the answer body, validated by [`parse_answer`].
#[derive(Debug, Deserialize)]
struct AnswerPayload {
    #[serde(default, rename = "type")]
    sdp_type: Option<String>,
    #[serde(default)]
    sdp: Option<String>,
}

/// Parses and shape-checks a 200 answer body.
///
/// A body that is not JSON is a serialization error; JSON that lacks a
/// non-empty `sdp` or whose `type` is not `answer` is a
/// [`SincroError::MalformedAnswer`].
pub fn parse_answer(body: &str) -> Result<SessionDescription> {
    let payload: AnswerPayload = serde_json::from_str(body)?;

    let sdp_type = payload
        .sdp_type
        .ok_or_else(|| SincroError::malformed_answer("missing 'type'"))?;
    if !sdp_type.eq_ignore_ascii_case("answer") {
        return Err(SincroError::malformed_answer(format!(
            "expected type 'answer', got '{}'",
            sdp_type
        )));
    }

    let sdp = payload
        .sdp
        .filter(|sdp| !sdp.trim().is_empty())
        .ok_or_else(|| SincroError::malformed_answer("missing 'sdp'"))?;

    Ok(SessionDescription::answer(sdp))
}

/// HTTP side of the signaling protocol.
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// `GET` the connection parameters.
    async fn fetch_config(&self, url: &str) -> Result<SignalingConfig>;

    /// `POST` the offer and return the remote answer.
    ///
    /// Status 429 maps to [`SincroError::RateLimited`], any other non-200
    /// to [`SincroError::UnexpectedStatus`].
    async fn post_offer(&self, url: &str, offer: &OfferRequest) -> Result<SessionDescription>;
}
