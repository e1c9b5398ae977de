//! Debug console state: connection state histories, the last SDP exchange,
//! and a short tail of each data channel's traffic.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::tracing_layer::RtcDebugEvent;

/// Lines kept per channel log.
pub const CHANNEL_LOG_LINES: usize = 10;

const INITIAL_STATE: &str = "new";

/// State transitions of one state machine, rendered as `new -> checking`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateHistory {
    states: Vec<String>,
}

impl StateHistory {
    /// Records a state. The initial state starts a fresh history.
    pub fn record(&mut self, state: &str) {
        if state == INITIAL_STATE {
            self.states.clear();
        }
        self.states.push(state.to_string());
    }

    pub fn current(&self) -> Option<&str> {
        self.states.last().map(String::as_str)
    }

    pub fn render(&self) -> String {
        self.states.join(" -> ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct DebugConsole {
    ice_connection: StateHistory,
    ice_gathering: StateHistory,
    signaling: StateHistory,
    offer_sdp: Option<String>,
    answer_sdp: Option<String>,
    channels: BTreeMap<String, Vec<String>>,
}

impl DebugConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one diagnostics event into the console.
    ///
    /// # Returns
    ///
    /// `false` if the event carried nothing the console shows.
    pub fn apply(&mut self, event: &RtcDebugEvent) -> bool {
        if let Some(state) = event.field("ice_connection_state") {
            self.ice_connection.record(state);
        } else if let Some(state) = event.field("ice_gathering_state") {
            self.ice_gathering.record(state);
        } else if let Some(state) = event.field("signaling_state") {
            self.signaling.record(state);
        } else if let Some(sdp) = event.field("offer_sdp") {
            self.offer_sdp = Some(sdp.to_string());
        } else if let Some(sdp) = event.field("answer_sdp") {
            self.answer_sdp = Some(sdp.to_string());
        } else if let (Some(channel), Some(payload)) =
            (event.field("channel"), event.field("payload"))
        {
            self.push_channel_line(channel, payload);
        } else {
            return false;
        }
        true
    }

    fn push_channel_line(&mut self, channel: &str, payload: &str) {
        let log = self.channels.entry(channel.to_string()).or_default();
        log.extend(payload.lines().map(str::to_string));
        if log.len() > CHANNEL_LOG_LINES {
            let excess = log.len() - CHANNEL_LOG_LINES;
            log.drain(..excess);
        }
    }

    pub fn ice_connection(&self) -> &StateHistory {
        &self.ice_connection
    }

    pub fn ice_gathering(&self) -> &StateHistory {
        &self.ice_gathering
    }

    pub fn signaling(&self) -> &StateHistory {
        &self.signaling
    }

    pub fn offer_sdp(&self) -> Option<&str> {
        self.offer_sdp.as_deref()
    }

    pub fn answer_sdp(&self) -> Option<&str> {
        self.answer_sdp.as_deref()
    }

    pub fn channel_log(&self, channel: &str) -> &[String] {
        self.channels.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Multi-line summary for a terminal.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("ICE connection: {}\n", self.ice_connection.render()));
        out.push_str(&format!("ICE gathering:  {}\n", self.ice_gathering.render()));
        out.push_str(&format!("Signaling:      {}\n", self.signaling.render()));
        for (channel, lines) in &self.channels {
            out.push_str(&format!("[{}]\n", channel));
            for line in lines {
                out.push_str("  ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// Applies events until every sender is dropped.
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<RtcDebugEvent>) {
        while let Some(event) = events.recv().await {
            self.apply(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn event(fields: &[(&str, &str)]) -> RtcDebugEvent {
        RtcDebugEvent {
            target: "sincro::rtc".to_string(),
            level: "INFO".to_string(),
            message: String::new(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
                .collect::<HashMap<_, _>>(),
            timestamp: String::new(),
        }
    }

    #[test]
    fn test_state_history() {
        let mut console = DebugConsole::new();
        for state in ["new", "checking", "connected"] {
            console.apply(&event(&[("ice_connection_state", state)]));
        }
        assert_eq!(console.ice_connection().render(), "new -> checking -> connected");
        assert_eq!(console.ice_connection().current(), Some("connected"));

        // A new session starts over.
        console.apply(&event(&[("ice_connection_state", "new")]));
        assert_eq!(console.ice_connection().render(), "new");
    }

    #[test]
    fn test_sdp_keeps_latest() {
        let mut console = DebugConsole::new();
        console.apply(&event(&[("offer_sdp", "v=0 first")]));
        console.apply(&event(&[("offer_sdp", "v=0 second")]));
        console.apply(&event(&[("answer_sdp", "v=0 answer")]));
        assert_eq!(console.offer_sdp(), Some("v=0 second"));
        assert_eq!(console.answer_sdp(), Some("v=0 answer"));
    }

    #[test]
    fn test_channel_log_keeps_last_lines() {
        let mut console = DebugConsole::new();
        for i in 0..15 {
            let payload = format!("< [telop_ch] {}", i);
            console.apply(&event(&[("channel", "telop_ch"), ("payload", &payload)]));
        }
        let log = console.channel_log("telop_ch");
        assert_eq!(log.len(), CHANNEL_LOG_LINES);
        assert_eq!(log[0], "< [telop_ch] 5");
        assert_eq!(log[9], "< [telop_ch] 14");
        assert!(console.channel_log("text_ch").is_empty());
    }

    #[test]
    fn test_unrelated_events_are_ignored() {
        let mut console = DebugConsole::new();
        assert!(!console.apply(&event(&[("other", "x")])));
        assert_eq!(console.ice_connection().render(), "");
    }
}
