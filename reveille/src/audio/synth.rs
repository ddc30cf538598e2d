//! Deterministic tone synthesis.
//!
//! Produces 16-bit signed mono PCM. Output depends only on the inputs, so
//! identical calls yield identical buffers and callers may cache them.
//!
//! Each sample is `signal(t) * envelope(i) * headroom * i16::MAX`, rounded,
//! where the envelope ramps linearly from 0 to 1 over the first 5% of the
//! buffer (attack) and then decays as `(1 - p)^2`, `p` being the sample's
//! position within the whole buffer.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Fraction of full scale a note may reach; leaves room for chords.
pub const DEFAULT_HEADROOM: f32 = 0.8;

const ATTACK_FRACTION: f64 = 0.05;

/// Oscillator shape. Persisted by its upper-case name (`SINE`, ...).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Signal value in [-1, 1] at `t` seconds for a tone of `frequency_hz`.
    fn signal(self, frequency_hz: f64, t: f64) -> f64 {
        let cycles = frequency_hz * t;
        let phase = cycles.fract();
        match self {
            Waveform::Sine => (TAU * cycles).sin(),
            Waveform::Square => {
                let s = (TAU * cycles).sin();
                let sign = if s > 0.0 {
                    1.0
                } else if s < 0.0 {
                    -1.0
                } else {
                    0.0
                };
                sign * 0.5
            }
            Waveform::Sawtooth => 2.0 * (phase - 0.5),
            Waveform::Triangle => 4.0 * (phase - 0.5).abs() - 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub sample_rate: u32,
    pub headroom: f32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            headroom: DEFAULT_HEADROOM,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Synthesizer {
    config: SynthConfig,
}

impl Synthesizer {
    pub fn new(config: SynthConfig) -> Self {
        Self { config }
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Number of samples in a buffer of `duration_ms`.
    pub fn sample_count(&self, duration_ms: u32) -> usize {
        (f64::from(duration_ms) * f64::from(self.config.sample_rate) / 1000.0).round() as usize
    }

    /// Synthesize `duration_ms` of `waveform` at `frequency_hz`.
    ///
    /// Non-positive or non-finite frequencies produce silence of the
    /// requested length.
    pub fn generate(&self, frequency_hz: f64, duration_ms: u32, waveform: Waveform) -> Vec<i16> {
        let n = self.sample_count(duration_ms);
        if n == 0 {
            return Vec::new();
        }
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return vec![0; n];
        }

        let rate = f64::from(self.config.sample_rate);
        let scale = f64::from(self.config.headroom) * f64::from(i16::MAX);

        (0..n)
            .map(|i| {
                let t = i as f64 / rate;
                let value = waveform.signal(frequency_hz, t) * envelope(i, n) * scale;
                value.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
            })
            .collect()
    }
}

fn envelope(i: usize, n: usize) -> f64 {
    let attack = ((n as f64) * ATTACK_FRACTION).round() as usize;
    if i < attack {
        return i as f64 / attack as f64;
    }
    let progress = (i as f64 / n as f64).clamp(0.0, 1.0);
    (1.0 - progress).powi(2)
}

/// Little-endian byte image of a PCM buffer.
pub fn to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
