//! Exponential backoff with jitter for retry scheduling.
//!
//! Delays grow geometrically per attempt, are capped, and carry a small
//! random jitter so retrying senders do not synchronize against a
//! recovering destination.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff schedule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Upper bound on any single delay, applied after jitter.
    pub cap: Duration,
    /// Jitter as a fraction of the delay (0.1 means ±10%).
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            multiplier: 2.0,
            cap: Duration::from_secs(60),
            jitter_factor: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// Attempt 1 waits `base`, attempt 2 waits `base * multiplier`, and so
    /// on. The exponent is clamped so large attempt numbers cannot overflow
    /// the float math, and the final jittered value never exceeds `cap`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let raw = self.base.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let capped = raw.min(self.cap.as_secs_f64());

        let jittered = apply_jitter(capped, self.jitter_factor);

        Duration::from_secs_f64(jittered.min(self.cap.as_secs_f64()))
    }
}

/// Randomizes a delay by ±`jitter_factor`.
fn apply_jitter(delay_secs: f64, jitter_factor: f64) -> f64 {
    if jitter_factor <= 0.0 || delay_secs <= 0.0 {
        return delay_secs;
    }

    let clamped = jitter_factor.clamp(0.0, 1.0);
    let range = delay_secs * clamped;

    let mut rng = rand::rng();
    let offset = rng.random_range(-range..=range);

    (delay_secs + offset).max(0.0)
}
