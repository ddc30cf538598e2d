//! Shake the device a number of times.
//!
//! An impulse counts when its magnitude exceeds the threshold and at least
//! the cooldown has passed since the last counted impulse. Readings inside
//! the cooldown are the same physical shake and are ignored.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::Progress;

/// Standard gravity, m/s².
pub const STANDARD_GRAVITY: f64 = 9.806_65;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShakeConfig {
    pub required: u32,
    /// Minimum magnitude in g for a reading to count.
    pub threshold_g: f64,
    pub cooldown_ms: u64,
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self {
            required: 10,
            threshold_g: 2.7,
            cooldown_ms: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShakeChallenge {
    config: ShakeConfig,
    count: u32,
    last_counted: Option<Instant>,
}

impl ShakeChallenge {
    pub fn new(config: ShakeConfig) -> Self {
        Self {
            config,
            count: 0,
            last_counted: None,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn required(&self) -> u32 {
        self.config.required
    }

    fn is_solved(&self) -> bool {
        self.count >= self.config.required
    }

    /// Feed one impulse of `magnitude_g` observed at `at`.
    pub fn on_impulse(&mut self, magnitude_g: f64, at: Instant) -> Progress {
        if self.is_solved() {
            return Progress::Solved;
        }
        if !(magnitude_g > self.config.threshold_g) {
            return Progress::Pending;
        }

        let cooldown = Duration::from_millis(self.config.cooldown_ms);
        let cooled = self
            .last_counted
            .is_none_or(|last| at.saturating_duration_since(last) >= cooldown);
        if cooled {
            self.count += 1;
            self.last_counted = Some(at);
        }

        if self.is_solved() {
            Progress::Solved
        } else {
            Progress::Pending
        }
    }

    /// Feed a raw accelerometer reading in m/s².
    pub fn on_acceleration(&mut self, x: f64, y: f64, z: f64, at: Instant) -> Progress {
        self.on_impulse(g_force(x, y, z), at)
    }
}

/// Magnitude of an acceleration vector in g.
pub fn g_force(x: f64, y: f64, z: f64) -> f64 {
    (x * x + y * y + z * z).sqrt() / STANDARD_GRAVITY
}
