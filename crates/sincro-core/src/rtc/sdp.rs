//! Codec filtering for outgoing offers.
//!
//! Restricts one media section of an SDP to a single codec (plus the RTX
//! payloads that repair it), so the far end can only answer with that
//! codec. The codec is named the way it appears in `a=rtpmap`, e.g.
//! `opus/48000/2`, `PCMU/8000`, `VP8/90000`, `H264/90000`.

use regex::Regex;
use std::sync::LazyLock;

use super::transport::TrackKind;

/// Codec name meaning "leave the section alone".
pub const DEFAULT_CODEC: &str = "default";

static RTX_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^a=fmtp:(\d+) apt=(\d+)$").expect("valid regex"));
static PAYLOAD_ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^a=(fmtp|rtcp-fb|rtpmap):(\d+)").expect("valid regex"));

/// Keeps only `codec` (and its RTX companions) in the `kind` media section.
///
/// Returns the input unchanged when `codec` is [`DEFAULT_CODEC`] or when no
/// payload type in that section matches `codec`.
pub fn filter_codec(sdp: &str, kind: TrackKind, codec: &str) -> String {
    if codec == DEFAULT_CODEC {
        return sdp.to_string();
    }

    let codec_line = match Regex::new(&format!(r"^a=rtpmap:(\d+) {}", regex::escape(codec))) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!("[Sdp] Invalid codec pattern {:?}: {}", codec, e);
            return sdp.to_string();
        }
    };
    let section = format!("m={} ", kind);
    let lines: Vec<&str> = sdp.lines().collect();

    let mut allowed: Vec<u32> = Vec::new();
    let mut in_section = false;
    for line in &lines {
        if line.starts_with(&section) {
            in_section = true;
        } else if line.starts_with("m=") {
            in_section = false;
        }
        if !in_section {
            continue;
        }
        if let Some(pt) = codec_line
            .captures(line)
            .and_then(|c| c[1].parse::<u32>().ok())
        {
            allowed.push(pt);
        }
        if let Some(caps) = RTX_LINE.captures(line) {
            if let (Ok(pt), Ok(apt)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) {
                if allowed.contains(&apt) {
                    allowed.push(pt);
                }
            }
        }
    }

    if allowed.is_empty() {
        tracing::warn!(
            "[Sdp] Codec {} not offered in {} section, leaving SDP unchanged",
            codec,
            kind
        );
        return sdp.to_string();
    }

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    in_section = false;
    for line in &lines {
        if line.starts_with(&section) {
            in_section = true;
        } else if line.starts_with("m=") {
            in_section = false;
        }

        if !in_section {
            out.push(line.to_string());
            continue;
        }

        if let Some(pt) = PAYLOAD_ATTRIBUTE
            .captures(line)
            .and_then(|c| c[2].parse::<u32>().ok())
        {
            if !allowed.contains(&pt) {
                continue;
            }
        }

        if line.starts_with(&section) {
            out.push(rewrite_media_line(line, &allowed));
        } else {
            out.push(line.to_string());
        }
    }

    let newline = if sdp.contains("\r\n") { "\r\n" } else { "\n" };
    let mut filtered = out.join(newline);
    if sdp.ends_with('\n') {
        filtered.push_str(newline);
    }
    filtered
}

/// `m=<kind> <port> <proto> <fmt...>` with the format list replaced.
fn rewrite_media_line(line: &str, allowed: &[u32]) -> String {
    let head: Vec<&str> = line.split_whitespace().take(3).collect();
    let formats: Vec<String> = allowed.iter().map(|pt| pt.to_string()).collect();
    format!("{} {}", head.join(" "), formats.join(" "))
}

/// Applies audio and video preferences in turn.
pub fn apply_codec_preferences(sdp: &str, audio_codec: &str, video_codec: &str) -> String {
    let sdp = filter_codec(sdp, TrackKind::Audio, audio_codec);
    filter_codec(&sdp, TrackKind::Video, video_codec)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\n\
o=- 1 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111 0 8\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=rtcp-fb:111 transport-cc\r\n\
a=fmtp:111 minptime=10;useinbandfec=1\r\n\
a=rtpmap:0 PCMU/8000\r\n\
a=rtpmap:8 PCMA/8000\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96 97 98 99\r\n\
a=rtpmap:96 VP8/90000\r\n\
a=rtpmap:97 rtx/90000\r\n\
a=fmtp:97 apt=96\r\n\
a=rtpmap:98 H264/90000\r\n\
a=rtpmap:99 rtx/90000\r\n\
a=fmtp:99 apt=98\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
a=sctp-port:5000\r\n";

    #[test]
    fn test_default_is_identity() {
        assert_eq!(filter_codec(OFFER, TrackKind::Audio, DEFAULT_CODEC), OFFER);
    }

    #[test]
    fn test_filter_audio_keeps_only_pcmu() {
        let filtered = filter_codec(OFFER, TrackKind::Audio, "PCMU/8000");
        assert!(filtered.contains("m=audio 9 UDP/TLS/RTP/SAVPF 0\r\n"));
        assert!(filtered.contains("a=rtpmap:0 PCMU/8000"));
        assert!(!filtered.contains("opus"));
        assert!(!filtered.contains("a=rtcp-fb:111"));
        assert!(!filtered.contains("PCMA"));
        // Other sections untouched
        assert!(filtered.contains("m=video 9 UDP/TLS/RTP/SAVPF 96 97 98 99\r\n"));
        assert!(filtered.contains("a=sctp-port:5000"));
        assert!(filtered.ends_with("\r\n"));
    }

    #[test]
    fn test_filter_video_keeps_rtx_companion() {
        let filtered = filter_codec(OFFER, TrackKind::Video, "VP8/90000");
        assert!(filtered.contains("m=video 9 UDP/TLS/RTP/SAVPF 96 97\r\n"));
        assert!(filtered.contains("a=fmtp:97 apt=96"));
        assert!(!filtered.contains("H264"));
        assert!(!filtered.contains("a=fmtp:99"));
    }

    #[test]
    fn test_unknown_codec_leaves_sdp_unchanged() {
        assert_eq!(filter_codec(OFFER, TrackKind::Audio, "G722/8000"), OFFER);
    }

    #[test]
    fn test_apply_both_preferences() {
        let filtered = apply_codec_preferences(OFFER, "opus/48000/2", "H264/90000");
        assert!(filtered.contains("m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n"));
        assert!(filtered.contains("m=video 9 UDP/TLS/RTP/SAVPF 98 99\r\n"));
    }
}
