//! Pull-based "which mora is active right now" scheduler.
//!
//! Network events are pushed in with [`MoraScheduler::add_event`] at
//! whatever rate they arrive; the render loop calls
//! [`MoraScheduler::current_unit`] every frame. Expiry is evaluated lazily
//! on read, there is no timer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::message::MoraEvent;
use crate::clock::{Clock, SystemClock};

/// Default number of events kept for diagnostics.
pub const DEFAULT_HISTORY_CAPACITY: usize = 512;

/// The unit created by a `new_text` event.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveMoraUnit {
    /// 1 for the first unit, incremented per `new_text` event.
    pub unit_id: u64,
    pub event: MoraEvent,
    pub duration_ms: f64,
    pub started_at_ms: f64,
    pub expires_at_ms: f64,
}

impl ActiveMoraUnit {
    /// Milliseconds since this unit became active.
    pub fn elapsed_ms(&self, now_ms: f64) -> f64 {
        now_ms - self.started_at_ms
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    history: VecDeque<MoraEvent>,
    active: Option<Arc<ActiveMoraUnit>>,
    units_started: u64,
}

/// Converts timed mora events into a queryable active unit.
///
/// The active unit is held behind a mutex so a network task can feed events
/// while a render thread polls. Readers get an `Arc`, which stays valid
/// even if the unit is replaced right after the read.
pub struct MoraScheduler<C: Clock = SystemClock> {
    clock: C,
    history_capacity: usize,
    state: Mutex<SchedulerState>,
}

impl MoraScheduler<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for MoraScheduler<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MoraScheduler<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    /// Sets the diagnostic history ring size (minimum 1).
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records an event and, for `new_text` events, makes it the active unit.
    ///
    /// A `new_text` event always replaces the current unit, expired or not.
    /// Other events only go to history.
    ///
    /// # Returns
    ///
    /// The id of the unit created by this event, if any.
    pub fn add_event(&self, event: MoraEvent) -> Option<u64> {
        let now = self.clock.now_ms();
        let mut state = self.lock();

        if state.history.len() >= self.history_capacity {
            state.history.pop_front();
        }
        state.history.push_back(event.clone());

        if !event.new_text {
            tracing::trace!(
                "[MoraScheduler] Supplementary event kept in history only: {:?}",
                event.text
            );
            return None;
        }

        state.units_started += 1;
        let duration_ms = event.duration_ms();
        let unit = ActiveMoraUnit {
            unit_id: state.units_started,
            event,
            duration_ms,
            started_at_ms: now,
            expires_at_ms: now + duration_ms,
        };
        let unit_id = unit.unit_id;
        state.active = Some(Arc::new(unit));
        Some(unit_id)
    }

    /// The unit active at this instant, or `None`.
    ///
    /// A unit whose window has passed is discarded here. While the window is
    /// open the same `Arc` is returned on every call; compare `unit_id` to
    /// detect a new unit.
    pub fn current_unit(&self) -> Option<Arc<ActiveMoraUnit>> {
        let now = self.clock.now_ms();
        let mut state = self.lock();

        let expired = match state.active.as_ref() {
            None => return None,
            Some(unit) => now >= unit.expires_at_ms,
        };
        if expired {
            state.active = None;
            return None;
        }
        state.active.clone()
    }

    /// Events received so far, oldest first (bounded by the history size).
    pub fn history(&self) -> Vec<MoraEvent> {
        self.lock().history.iter().cloned().collect()
    }

    /// Number of `new_text` events seen.
    pub fn units_started(&self) -> u64 {
        self.lock().units_started
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
