use sincro_console::{DebugConsole, RtcEventLayer};
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;

#[tokio::test]
async fn test_rtc_events_reach_console() {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscriber = tracing_subscriber::registry().with(RtcEventLayer::new(tx));

    tracing::subscriber::with_default(subscriber, || {
        for state in ["new", "checking", "connected"] {
            tracing::info!(target: "sincro::rtc", ice_connection_state = state, "ice connection state");
        }
        tracing::debug!(target: "sincro::rtc", ice_gathering_state = "gathering", "ice gathering state");
        tracing::debug!(target: "sincro::rtc", ice_gathering_state = "complete", "ice gathering state");
        tracing::info!(target: "sincro::rtc", offer_sdp = "v=0\r\nm=audio", "offer");
        tracing::info!(
            target: "sincro::rtc",
            channel = "text_ch",
            payload = "- open(text_ch)",
            "channel open"
        );
        tracing::info!("[PeerNegotiator] unrelated");
    });

    // Dropping the subscriber drops the sender and ends `run`.
    let mut console = DebugConsole::new();
    console.run(rx).await;

    assert_eq!(console.ice_connection().render(), "new -> checking -> connected");
    assert_eq!(console.ice_gathering().render(), "gathering -> complete");
    assert_eq!(console.offer_sdp(), Some("v=0\r\nm=audio"));
    assert_eq!(console.channel_log("text_ch"), ["- open(text_ch)".to_string()]);
    assert!(console.render().contains("[text_ch]"));
}
