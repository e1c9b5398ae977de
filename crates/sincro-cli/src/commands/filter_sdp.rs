use std::io::{Read, Write};

use anyhow::{Context, Result};
use sincro_core::rtc::TrackKind;
use sincro_core::rtc::sdp::{DEFAULT_CODEC, filter_codec};

pub fn run(kind: TrackKind, codec: &str) -> Result<()> {
    let mut sdp = String::new();
    std::io::stdin()
        .read_to_string(&mut sdp)
        .context("Failed to read SDP from stdin")?;

    let filtered = filter_codec(&sdp, kind, codec);
    if filtered == sdp && codec != DEFAULT_CODEC {
        tracing::warn!("No {} payload matched '{}'; SDP unchanged", kind, codec);
    }

    std::io::stdout()
        .write_all(filtered.as_bytes())
        .context("Failed to write SDP")?;
    Ok(())
}
