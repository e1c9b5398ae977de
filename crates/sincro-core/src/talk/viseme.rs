//! Mouth shape weights derived from the active mora.
//!
//! A new unit starts a step envelope: half open immediately, fully open after
//! 60 ms, and closing over the 50 ms following the unit's duration. The
//! envelope runs on its own clock, so the mouth still closes smoothly after
//! the scheduler has already expired the unit.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::mora::MoraScheduler;
use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vowel {
    A,
    I,
    U,
    E,
    O,
    N,
    /// Anything else the synthesizer emits (`cl`, `pau`, ...).
    Unknown,
}

impl Vowel {
    /// Case-insensitive parse; never fails.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Vowel::A,
            "I" => Vowel::I,
            "U" => Vowel::U,
            "E" => Vowel::E,
            "O" => Vowel::O,
            "N" => Vowel::N,
            _ => Vowel::Unknown,
        }
    }
}

impl fmt::Display for Vowel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Vowel::A => "A",
            Vowel::I => "I",
            Vowel::U => "U",
            Vowel::E => "E",
            Vowel::O => "O",
            Vowel::N => "N",
            Vowel::Unknown => "?",
        };
        f.write_str(s)
    }
}

/// Blend weights for the five mouth morph targets, each in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MouthWeights {
    pub a: f32,
    pub i: f32,
    pub u: f32,
    pub e: f32,
    pub o: f32,
}

impl MouthWeights {
    pub const CLOSED: MouthWeights = MouthWeights {
        a: 0.0,
        i: 0.0,
        u: 0.0,
        e: 0.0,
        o: 0.0,
    };

    /// Only the target matching `vowel` is set; `N` and unknown vowels stay closed.
    pub fn for_vowel(vowel: Vowel, openness: f32) -> Self {
        let mut weights = Self::CLOSED;
        match vowel {
            Vowel::A => weights.a = openness,
            Vowel::I => weights.i = openness,
            Vowel::U => weights.u = openness,
            Vowel::E => weights.e = openness,
            Vowel::O => weights.o = openness,
            Vowel::N | Vowel::Unknown => {}
        }
        weights
    }

    pub fn is_closed(&self) -> bool {
        *self == Self::CLOSED
    }
}

/// Openness at `elapsed_ms` into a unit lasting `duration_ms`.
///
/// Keyframes are applied in time order and the latest one at or before
/// `elapsed_ms` wins; for very short units the closing keyframes overtake
/// the opening ones.
pub fn envelope(elapsed_ms: f64, duration_ms: f64) -> f32 {
    if elapsed_ms < 0.0 {
        return 0.0;
    }
    let mut keyframes = [
        (0.0, 0.5),
        (30.0, 0.8),
        (60.0, 1.0),
        (duration_ms + 10.0, 0.8),
        (duration_ms + 30.0, 0.5),
        (duration_ms + 50.0, 0.0),
    ];
    // Stable sort keeps scheduling order for keyframes at the same instant.
    keyframes.sort_by(|a, b| a.0.total_cmp(&b.0));

    keyframes
        .iter()
        .take_while(|(at, _)| *at <= elapsed_ms)
        .last()
        .map(|(_, value)| *value)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy)]
struct Articulation {
    vowel: Vowel,
    started_at_ms: f64,
    duration_ms: f64,
}

/// Per-frame viseme driver.
///
/// Call [`VisemeTracker::poll`] once per rendered frame.
#[derive(Debug, Default)]
pub struct VisemeTracker {
    last_unit_id: Option<u64>,
    articulation: Option<Articulation>,
}

impl VisemeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the scheduler and returns the weights for this instant.
    ///
    /// A unit without a vowel (leading silence) is acknowledged but leaves
    /// the running envelope alone.
    pub fn poll<C: Clock>(&mut self, scheduler: &MoraScheduler<C>) -> MouthWeights {
        let now = scheduler.clock().now_ms();

        if let Some(unit) = scheduler.current_unit() {
            if self.last_unit_id != Some(unit.unit_id) {
                self.last_unit_id = Some(unit.unit_id);
                if let Some(vowel) = unit.event.vowel.as_deref() {
                    let vowel = Vowel::parse(vowel);
                    tracing::trace!(
                        "[VisemeTracker] Unit {} vowel {} for {:.0}ms",
                        unit.unit_id,
                        vowel,
                        unit.duration_ms
                    );
                    self.articulation = Some(Articulation {
                        vowel,
                        started_at_ms: unit.started_at_ms,
                        duration_ms: unit.duration_ms,
                    });
                }
            }
        }

        self.weights_at(now)
    }

    /// Weights for the current envelope at `now_ms` without reading the scheduler.
    pub fn weights_at(&self, now_ms: f64) -> MouthWeights {
        match self.articulation {
            None => MouthWeights::CLOSED,
            Some(a) => {
                let openness = envelope(now_ms - a.started_at_ms, a.duration_ms);
                MouthWeights::for_vowel(a.vowel, openness)
            }
        }
    }

    pub fn last_unit_id(&self) -> Option<u64> {
        self.last_unit_id
    }
}
