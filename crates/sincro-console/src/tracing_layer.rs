//! Tracing layer that forwards connection diagnostics to the debug console.
//!
//! Only events on the `sincro::rtc` target are captured; they are sent over
//! an unbounded channel so the emitting task never waits on the console.

use serde_json::Value;
use sincro_core::rtc::RTC_LOG_TARGET;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// A captured diagnostics event
#[derive(Debug, Clone, serde::Serialize)]
pub struct RtcDebugEvent {
    /// Event target (always under `sincro::rtc`)
    pub target: String,
    /// Log level (INFO, DEBUG, WARN, ERROR)
    pub level: String,
    /// Human-readable message
    pub message: String,
    /// Structured fields (e.g. ice_connection_state, offer_sdp, channel)
    pub fields: HashMap<String, Value>,
    pub timestamp: String,
}

impl RtcDebugEvent {
    /// String value of a structured field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

/// Sends every `sincro::rtc` event to a channel
pub struct RtcEventLayer {
    sender: mpsc::UnboundedSender<RtcDebugEvent>,
}

impl RtcEventLayer {
    pub fn new(sender: mpsc::UnboundedSender<RtcDebugEvent>) -> Self {
        Self { sender }
    }

    fn captures(target: &str) -> bool {
        target == RTC_LOG_TARGET
            || target
                .strip_prefix(RTC_LOG_TARGET)
                .is_some_and(|rest| rest.starts_with("::"))
    }
}

impl<S> Layer<S> for RtcEventLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !Self::captures(metadata.target()) {
            return;
        }

        let mut fields = HashMap::new();
        let mut visitor = FieldVisitor(&mut fields);
        event.record(&mut visitor);

        let debug_event = RtcDebugEvent {
            target: metadata.target().to_string(),
            level: metadata.level().to_string(),
            message: fields
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        // The console may already be gone.
        let _ = self.sender.send(debug_event);
    }
}

/// Field visitor that extracts tracing event fields into a HashMap
struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl<'a> tracing::field::Visit for FieldVisitor<'a> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        // `%value` fields arrive here already Display-formatted.
        self.0.insert(
            field.name().to_string(),
            serde_json::json!(format!("{:?}", value)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_captures_only_rtc_target() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(RtcEventLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "sincro::rtc", ice_connection_state = "checking", "ice connection state");
            tracing::info!(target: "sincro::rtcx", "not captured");
            tracing::info!("[PeerNegotiator] not captured either");
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.target, "sincro::rtc");
        assert_eq!(event.level, "INFO");
        assert_eq!(event.message, "ice connection state");
        assert_eq!(event.field("ice_connection_state"), Some("checking"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_display_fields_are_plain_strings() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(RtcEventLayer::new(tx));
        let sdp = String::from("v=0");

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "sincro::rtc", offer_sdp = %sdp, "offer");
        });

        assert_eq!(rx.try_recv().unwrap().field("offer_sdp"), Some("v=0"));
    }
}
