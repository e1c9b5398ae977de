//! Randomized reconnect delay.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest delay ever returned; a reconnect is never immediate.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Reconnect delay = `base + uniform(0, jitter)`.
///
/// Clients that fail together (signaling host restart, network blip) spread
/// their retries over the jitter window instead of hitting the offer
/// endpoint in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(with = "millis")]
    pub base: Duration,
    #[serde(with = "millis")]
    pub jitter: Duration,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    /// Draws a delay from the thread-local RNG.
    pub fn next_delay(&self) -> Duration {
        self.next_delay_with(&mut rand::thread_rng())
    }

    /// Draws a delay from the given RNG.
    pub fn next_delay_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rng.gen_range(0..jitter_ms)
        };
        (self.base + Duration::from_millis(extra)).max(MIN_DELAY)
    }
}

impl Default for ReconnectPolicy {
    /// 10–30 seconds.
    fn default() -> Self {
        Self {
            base: Duration::from_secs(10),
            jitter: Duration::from_secs(20),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
