use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use sincro_console::{RtcDebugEvent, RtcEventLayer};
use sincro_core::rtc::TrackKind;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

#[derive(Parser)]
#[command(name = "sincro")]
#[command(about = "Sincro - real-time talk client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to the speech server until Ctrl-C
    Talk {
        /// Settings file (default: ~/.config/sincro/client.toml)
        #[arg(long)]
        settings: Option<PathBuf>,
        /// URL of the RTC config JSON
        #[arg(long)]
        config_url: Option<String>,
        /// `talk_mode` sent with the offer
        #[arg(long)]
        mode: Option<String>,
        /// Also request a camera track
        #[arg(long)]
        video: bool,
        /// Print connection diagnostics
        #[arg(long)]
        debug: bool,
    },
    /// Restrict an SDP read from stdin to one codec
    FilterSdp {
        #[arg(long, value_enum)]
        kind: KindArg,
        /// rtpmap codec name, e.g. opus/48000/2
        #[arg(long)]
        codec: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Audio,
    Video,
}

impl From<KindArg> for TrackKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Audio => TrackKind::Audio,
            KindArg::Video => TrackKind::Video,
        }
    }
}

/// Installs the process subscriber. With `debug`, `sincro::rtc` events are
/// also forwarded to the returned receiver.
fn init_tracing(debug: bool) -> Option<mpsc::UnboundedReceiver<RtcDebugEvent>> {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (layer, rx) = if debug {
        if let Ok(directive) = "sincro::rtc=debug".parse() {
            filter = filter.add_directive(directive);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        (Some(RtcEventLayer::new(tx)), Some(rx))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(layer)
        .init();
    rx
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Talk {
            settings,
            config_url,
            mode,
            video,
            debug,
        } => {
            let debug_events = init_tracing(debug);
            let args = commands::talk::TalkArgs {
                settings,
                config_url,
                mode,
                video,
            };
            commands::talk::run(args, debug_events).await?;
        }
        Commands::FilterSdp { kind, codec } => {
            init_tracing(false);
            commands::filter_sdp::run(kind.into(), &codec)?;
        }
    }

    Ok(())
}
