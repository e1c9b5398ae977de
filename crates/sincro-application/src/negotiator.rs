//! Peer session negotiation and recovery.
//!
//! `PeerNegotiator` owns at most one live `PeerSession` at a time. Each
//! attempt builds a brand-new transport through the [`TransportFactory`];
//! a failed session is torn down and rebuilt from scratch after a
//! randomized delay, never repaired in place.
//!
//! Every attempt carries a generation number. `stop()` and every new
//! attempt bump it, and every asynchronous continuation (event loop,
//! reconnect timer, the negotiation itself after each await) re-checks it
//! before touching shared state.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use sincro_core::chat::NoticeSink;
use sincro_core::config::{ConfigSlot, SignalingConfig};
use sincro_core::reconnect::ReconnectPolicy;
use sincro_core::rtc::{
    DataChannel, IceConnectionState, IceGatheringState, LocalTrack, OfferRequest, PeerTransport,
    RTC_LOG_TARGET, SessionDescription, SignalingClient, TransportEvent, TransportFactory, sdp,
};
use sincro_core::{Result, SincroError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::router::ChannelRouter;

/// Default `talk_mode` tag sent with every offer.
pub const DEFAULT_TALK_MODE: &str = "sincro";

const START_NOTICE: &str = "Starting a session with the speech server.";

#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatorOptions {
    /// Forwarded verbatim as `talk_mode`; `None` omits the field.
    pub talk_mode: Option<String>,
    pub reconnect: ReconnectPolicy,
    /// Delay between closing the channels and closing the transport.
    pub close_grace: Duration,
    pub audio_codec: String,
    pub video_codec: String,
}

impl Default for NegotiatorOptions {
    fn default() -> Self {
        Self {
            talk_mode: Some(DEFAULT_TALK_MODE.to_string()),
            reconnect: ReconnectPolicy::default(),
            close_grace: Duration::from_millis(1000),
            audio_codec: sdp::DEFAULT_CODEC.to_string(),
            video_codec: sdp::DEFAULT_CODEC.to_string(),
        }
    }
}

/// Result of one `start()` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// The answer was applied; ICE continues asynchronously.
    Connected,
    /// The attempt failed and a fresh attempt is scheduled.
    Failed { reconnect_in: Duration },
    /// `stop()` ran while the attempt was in flight.
    Superseded,
}

/// One attempt's resources.
struct PeerSession {
    generation: u64,
    transport: Arc<dyn PeerTransport>,
    channels: Vec<Arc<dyn DataChannel>>,
    event_loop: Option<JoinHandle<()>>,
}

struct State {
    generation: u64,
    live: bool,
    session: Option<PeerSession>,
    track: Option<Arc<dyn LocalTrack>>,
    /// Outlives sessions so a rebuilt session comes up muted too.
    muted: bool,
    reconnect: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

struct Inner {
    factory: Arc<dyn TransportFactory>,
    signaling: Arc<dyn SignalingClient>,
    notices: Arc<dyn NoticeSink>,
    config: ConfigSlot,
    router: ChannelRouter,
    options: NegotiatorOptions,
    state: Mutex<State>,
}

/// Drives the offer/answer exchange against the signaling host.
///
/// Cloning shares the negotiator.
#[derive(Clone)]
pub struct PeerNegotiator {
    inner: Arc<Inner>,
}

impl PeerNegotiator {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        signaling: Arc<dyn SignalingClient>,
        notices: Arc<dyn NoticeSink>,
        config: ConfigSlot,
        router: ChannelRouter,
        options: NegotiatorOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                signaling,
                notices,
                config,
                router,
                options,
                state: Mutex::new(State {
                    generation: 0,
                    live: false,
                    session: None,
                    track: None,
                    muted: false,
                    reconnect: None,
                    cancel: CancellationToken::new(),
                }),
            }),
        }
    }

    pub fn options(&self) -> &NegotiatorOptions {
        &self.inner.options
    }

    /// Starts a session with `track` as the outbound audio.
    ///
    /// # Returns
    ///
    /// - `Err(ConfigNotResolved)` before the signaling config is resolved
    /// - `Err(AlreadyStarted)` while a previous `start()` has not been stopped
    /// - `Ok(outcome)` otherwise; negotiation failures are reported through
    ///   the notice sink and yield [`NegotiationOutcome::Failed`]
    pub async fn start(&self, track: Arc<dyn LocalTrack>) -> Result<NegotiationOutcome> {
        if !self.inner.config.is_resolved() {
            return Err(SincroError::ConfigNotResolved);
        }
        {
            let mut state = self.inner.lock_state();
            if state.live {
                return Err(SincroError::AlreadyStarted);
            }
            state.live = true;
            state.track = Some(track);
            state.cancel = CancellationToken::new();
        }
        tracing::info!("[PeerNegotiator] Starting session");
        Ok(self.inner.clone().attempt().await)
    }

    /// Tears the current session down. Safe to call repeatedly and while
    /// `start()` is still negotiating.
    pub async fn stop(&self) {
        let (session, reconnect) = {
            let mut state = self.inner.lock_state();
            state.generation += 1;
            state.live = false;
            state.track = None;
            state.cancel.cancel();
            (state.session.take(), state.reconnect.take())
        };

        if let Some(handle) = reconnect {
            tracing::debug!("[PeerNegotiator] Cancelled pending reconnect");
            handle.abort();
        }

        if let Some(session) = session {
            tracing::info!("[PeerNegotiator] Stopping session {}", session.generation);
            self.inner.teardown(session, true).await;
        }
    }

    /// Gates every outbound sender's track without renegotiating.
    ///
    /// The setting sticks across reconnects: a session rebuilt after a
    /// failure, or started later, sends nothing until unmuted.
    pub fn set_mute(&self, muted: bool) {
        let (track, transport) = {
            let mut state = self.inner.lock_state();
            state.muted = muted;
            (
                state.track.clone(),
                state.session.as_ref().map(|s| s.transport.clone()),
            )
        };
        if let Some(track) = track {
            track.set_enabled(!muted);
        }
        if let Some(transport) = transport {
            for track in transport.senders() {
                track.set_enabled(!muted);
            }
        }
        tracing::debug!("[PeerNegotiator] Mute set to {}", muted);
    }

    /// Whether outbound audio is currently muted.
    pub fn is_muted(&self) -> bool {
        self.inner.lock_state().muted
    }

    /// Whether `start()` has been called and not stopped since.
    pub fn is_live(&self) -> bool {
        self.inner.lock_state().live
    }

    /// Whether a reconnect timer is pending.
    pub fn has_pending_reconnect(&self) -> bool {
        self.inner
            .lock_state()
            .reconnect
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Generation of the most recent attempt.
    pub fn generation(&self) -> u64 {
        self.inner.lock_state().generation
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_muted(&self) -> bool {
        self.lock_state().muted
    }

    /// Whether a reconnect timer is already armed, e.g. by an ICE failure
    /// that raced the negotiation.
    fn reconnect_armed(&self) -> bool {
        self.lock_state().reconnect.is_some()
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.lock_state();
        state.live && state.generation == generation
    }

    /// Whether the session of `generation` is still installed.
    fn owns_session(&self, generation: u64) -> bool {
        let state = self.lock_state();
        state.live
            && state.generation == generation
            && state
                .session
                .as_ref()
                .is_some_and(|session| session.generation == generation)
    }

    /// Runs one attempt under a fresh generation.
    async fn attempt(self: Arc<Self>) -> NegotiationOutcome {
        let (generation, track, cancel) = {
            let mut state = self.lock_state();
            if !state.live {
                return NegotiationOutcome::Superseded;
            }
            state.generation += 1;
            if let Some(handle) = state.reconnect.take() {
                handle.abort();
            }
            let Some(track) = state.track.clone() else {
                return NegotiationOutcome::Superseded;
            };
            (state.generation, track, state.cancel.clone())
        };

        self.notices.system(START_NOTICE);

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(None),
            result = self.clone().negotiate(generation, track) => result.map_err(Some),
        };

        match result {
            Ok(()) if self.owns_session(generation) => {
                tracing::info!("[PeerNegotiator] Session {} negotiated", generation);
                NegotiationOutcome::Connected
            }
            Ok(()) | Err(None) => NegotiationOutcome::Superseded,
            Err(Some(e)) => {
                if !self.is_current(generation) || self.reconnect_armed() {
                    tracing::debug!(
                        "[PeerNegotiator] Ignoring failure of superseded session {}: {}",
                        generation,
                        e
                    );
                    return NegotiationOutcome::Superseded;
                }
                tracing::warn!("[PeerNegotiator] Negotiation failed: {}", e);
                self.notices.error(&e.user_message(), false);
                self.discard_session(generation).await;
                match self.schedule_reconnect(generation) {
                    Some(reconnect_in) => NegotiationOutcome::Failed { reconnect_in },
                    None => NegotiationOutcome::Superseded,
                }
            }
        }
    }

    async fn negotiate(self: Arc<Self>, generation: u64, track: Arc<dyn LocalTrack>) -> Result<()> {
        let config = self
            .config
            .get()
            .cloned()
            .ok_or(SincroError::ConfigNotResolved)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = self.factory.create(&config.ice_servers, events_tx).await?;
        if !self.register_session(generation, transport.clone()) {
            let _ = transport.close().await;
            return Ok(());
        }
        self.spawn_event_loop(generation, events_rx);

        if self.is_muted() {
            track.set_enabled(false);
        }
        transport.add_track(track).await?;
        let channels = self.router.open_channels(transport.as_ref()).await?;
        self.attach_channels(generation, channels);

        let offer = transport.create_offer().await?;
        transport.set_local_description(offer).await?;

        wait_for_gathering(transport.as_ref()).await?;
        if !self.owns_session(generation) {
            return Ok(());
        }

        let mut offer = transport
            .local_description()
            .await
            .ok_or(SincroError::NullLocalDescription)?;
        offer.sdp = sdp::apply_codec_preferences(
            &offer.sdp,
            &self.options.audio_codec,
            &self.options.video_codec,
        );
        tracing::info!(target: RTC_LOG_TARGET, offer_sdp = %offer.sdp, "offer");

        let answer = self
            .post_offer(&config, OfferRequest::new(offer, self.options.talk_mode.clone()))
            .await?;
        // An ICE failure during the POST discards this transport.
        if !self.owns_session(generation) {
            return Ok(());
        }

        tracing::info!(target: RTC_LOG_TARGET, answer_sdp = %answer.sdp, "answer");
        transport.set_remote_description(answer).await?;
        Ok(())
    }

    async fn post_offer(
        &self,
        config: &SignalingConfig,
        request: OfferRequest,
    ) -> Result<SessionDescription> {
        tracing::debug!("[PeerNegotiator] Posting offer to {}", config.offer_url);
        self.signaling.post_offer(&config.offer_url, &request).await
    }

    /// Makes `transport` the current session. Returns `false` if the
    /// attempt was superseded while the transport was being built.
    fn register_session(&self, generation: u64, transport: Arc<dyn PeerTransport>) -> bool {
        let mut state = self.lock_state();
        if !state.live || state.generation != generation {
            return false;
        }
        state.session = Some(PeerSession {
            generation,
            transport,
            channels: Vec::new(),
            event_loop: None,
        });
        true
    }

    fn attach_channels(&self, generation: u64, channels: Vec<Arc<dyn DataChannel>>) {
        let mut state = self.lock_state();
        if let Some(session) = state.session.as_mut() {
            if session.generation == generation {
                session.channels = channels;
            }
        }
    }

    fn spawn_event_loop(
        self: &Arc<Self>,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut last_ice: Option<IceConnectionState> = None;
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !inner.owns_session(generation) {
                    break;
                }
                match event {
                    TransportEvent::IceConnectionState(ice) => {
                        if last_ice == Some(ice) {
                            continue;
                        }
                        last_ice = Some(ice);
                        inner.on_ice_connection_state(generation, ice).await;
                    }
                    TransportEvent::IceGatheringState(gathering) => {
                        tracing::debug!(
                            target: RTC_LOG_TARGET,
                            ice_gathering_state = gathering.as_str(),
                            "ice gathering state"
                        );
                    }
                    TransportEvent::SignalingState(signaling) => {
                        tracing::debug!(
                            target: RTC_LOG_TARGET,
                            signaling_state = signaling.as_str(),
                            "signaling state"
                        );
                    }
                    other => {
                        inner.router.dispatch(other);
                    }
                }
            }
        });

        let mut state = self.lock_state();
        match state.session.as_mut() {
            Some(session) if session.generation == generation => {
                session.event_loop = Some(handle);
            }
            _ => handle.abort(),
        }
    }

    async fn on_ice_connection_state(self: &Arc<Self>, generation: u64, ice: IceConnectionState) {
        tracing::info!(
            target: RTC_LOG_TARGET,
            ice_connection_state = ice.as_str(),
            "ice connection state"
        );

        let notice = ice_notice(ice);
        if ice.is_error() {
            self.notices.error(notice, false);
        } else {
            self.notices.system(notice);
        }

        if ice.requires_reconnect() {
            tracing::warn!("[PeerNegotiator] ICE failed on session {}", generation);
            self.schedule_reconnect(generation);
            self.discard_session(generation).await;
        }
    }

    /// Removes and tears down the session of `generation`, keeping the
    /// caller's track alive for the next attempt.
    async fn discard_session(&self, generation: u64) {
        let session = {
            let mut state = self.lock_state();
            let owned = state
                .session
                .as_ref()
                .is_some_and(|session| session.generation == generation);
            if owned { state.session.take() } else { None }
        };
        if let Some(session) = session {
            self.teardown(session, false).await;
        }
    }

    /// Closes a session's resources. `stopping` marks an explicit `stop()`,
    /// which also ends the caller's tracks and the event loop; a discarded
    /// session's event loop exits by itself once it sees the session gone.
    async fn teardown(&self, mut session: PeerSession, stopping: bool) {
        for channel in &session.channels {
            if let Err(e) = channel.close().await {
                tracing::debug!(
                    "[PeerNegotiator] Closing channel {} failed: {}",
                    channel.label(),
                    e
                );
            }
        }

        if stopping {
            for track in session.transport.senders() {
                track.stop();
            }
        }

        if session.transport.supports_transceivers() {
            session.transport.stop_transceivers().await;
        }

        let transport = session.transport.clone();
        let grace = self.options.close_grace;
        let generation = session.generation;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Err(e) = transport.close().await {
                tracing::warn!(
                    "[PeerNegotiator] Closing transport of session {} failed: {}",
                    generation,
                    e
                );
            }
        });

        if stopping {
            if let Some(handle) = session.event_loop.take() {
                handle.abort();
            }
        }
    }

    /// Arms the reconnect timer for a failed `generation`.
    ///
    /// Returns the drawn delay, or `None` if the negotiator was stopped or
    /// moved on in the meantime.
    fn schedule_reconnect(self: &Arc<Self>, generation: u64) -> Option<Duration> {
        let mut state = self.lock_state();
        if !state.live || state.generation != generation {
            return None;
        }

        let delay = self.options.reconnect.next_delay();
        tracing::info!(
            "[PeerNegotiator] Reconnecting in {} ms (session {})",
            delay.as_millis(),
            generation
        );

        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let mut state = inner.lock_state();
                if !state.live || state.generation != generation {
                    return;
                }
                // The attempt must not abort the task it is running on.
                state.reconnect = None;
            }
            inner.attempt().await;
        });

        if let Some(previous) = state.reconnect.replace(handle) {
            previous.abort();
        }
        Some(delay)
    }
}

/// Waits until ICE gathering is complete.
///
/// A transport that is already complete is never subscribed to.
async fn wait_for_gathering(transport: &dyn PeerTransport) -> Result<()> {
    if transport.ice_gathering_state() == IceGatheringState::Complete {
        return Ok(());
    }
    let mut gathering = transport.watch_ice_gathering();
    gathering
        .wait_for(|state| *state == IceGatheringState::Complete)
        .await
        .map_err(|_| SincroError::transport("ICE gathering ended before completion"))?;
    Ok(())
}

/// Status text shown for an ICE connection state.
pub fn ice_notice(state: IceConnectionState) -> &'static str {
    match state {
        IceConnectionState::New => "Connecting to the speech server.",
        IceConnectionState::Checking => "Checking the connection to the speech server.",
        IceConnectionState::Connected => "Connected to the speech server.",
        IceConnectionState::Completed => "Session with the speech server established.",
        IceConnectionState::Disconnected => "Disconnected from the speech server.",
        IceConnectionState::Failed => "Could not connect to the speech server.",
        IceConnectionState::Closed => "Connection to the speech server closed.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = NegotiatorOptions::default();
        assert_eq!(options.talk_mode.as_deref(), Some("sincro"));
        assert_eq!(options.close_grace, Duration::from_secs(1));
        assert_eq!(options.audio_codec, sdp::DEFAULT_CODEC);
        assert_eq!(options.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn test_ice_notices_are_distinct() {
        let states = [
            IceConnectionState::New,
            IceConnectionState::Checking,
            IceConnectionState::Connected,
            IceConnectionState::Completed,
            IceConnectionState::Disconnected,
            IceConnectionState::Failed,
            IceConnectionState::Closed,
        ];
        let mut notices: Vec<_> = states.iter().map(|s| ice_notice(*s)).collect();
        notices.sort();
        notices.dedup();
        assert_eq!(notices.len(), states.len());
    }
}
