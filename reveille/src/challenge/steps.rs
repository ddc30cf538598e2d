//! Walk a number of steps.
//!
//! Step sensors report a cumulative counter since boot. Progress is the
//! delta from a baseline: the session's first reading when one is known,
//! otherwise the first reading this challenge sees. Without a sensor the challenge is degraded and can only
//! be left by snoozing.

use serde::{Deserialize, Serialize};

use super::Progress;
use crate::tracing::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepsConfig {
    pub required: u32,
    /// Whether the host has a step-counting sensor.
    pub sensor_available: bool,
}

impl Default for StepsConfig {
    fn default() -> Self {
        Self {
            required: 20,
            sensor_available: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepChallenge {
    required: u32,
    degraded: bool,
    baseline: Option<u64>,
    latest: u64,
}

impl StepChallenge {
    pub fn new(config: StepsConfig) -> Self {
        if !config.sensor_available {
            warn!("No step sensor, walk challenge cannot complete");
        }
        Self {
            required: config.required,
            degraded: !config.sensor_available,
            baseline: None,
            latest: 0,
        }
    }

    /// Count from an earlier `baseline` and catch up to `latest`, so a
    /// re-presented challenge keeps the steps already walked.
    pub fn resume_from(&mut self, baseline: u64, latest: u64) -> Progress {
        self.baseline = Some(baseline);
        self.latest = baseline;
        self.on_steps(latest)
    }

    pub fn required(&self) -> u32 {
        self.required
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Steps taken since the first reading.
    pub fn taken(&self) -> u64 {
        self.baseline
            .map_or(0, |baseline| self.latest.saturating_sub(baseline))
    }

    /// Mark the sensor as lost. Permanent for this challenge.
    pub fn sensor_lost(&mut self) {
        if !self.degraded {
            warn!("Step sensor lost, walk challenge degraded");
            self.degraded = true;
        }
    }

    /// Feed a cumulative step count.
    pub fn on_steps(&mut self, cumulative: u64) -> Progress {
        if self.degraded {
            return Progress::Pending;
        }

        match self.baseline {
            None => {
                self.baseline = Some(cumulative);
                self.latest = cumulative;
            }
            Some(_) if cumulative < self.latest => {
                debug!(cumulative, latest = self.latest, "Ignoring decreasing step count");
            }
            Some(_) => self.latest = cumulative,
        }

        if self.taken() >= u64::from(self.required) {
            Progress::Solved
        } else {
            Progress::Pending
        }
    }
}
