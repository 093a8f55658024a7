//! Deterministic synthetic sensors for bench runs without hardware.
//!
//! [`SimulatedMotion`] sweeps roll and pitch through slow sine waves at 1 g.
//! [`SimulatedAcoustic`] produces pseudo-random amplitude around a base level
//! from a fixed seed, so two runs with the same seed see the same samples.

use std::f64::consts::TAU;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{AcousticSensor, MotionSensor, ACOUSTIC_FULL_SCALE};
use crate::orientation::{RawMotionSample, ONE_G_COUNTS};

/// Synthetic accelerometer.
#[derive(Debug, Clone)]
pub struct SimulatedMotion {
    roll_amplitude: f64,
    pitch_amplitude: f64,
    cycle_samples: u32,
    step: u32,
    one_g: f64,
}

impl Default for SimulatedMotion {
    fn default() -> Self {
        Self::new(35.0, 10.0, 500)
    }
}

impl SimulatedMotion {
    /// Sweep roll and pitch (degrees) over `cycle_samples` samples.
    #[must_use]
    pub fn new(roll_amplitude: f64, pitch_amplitude: f64, cycle_samples: u32) -> Self {
        Self {
            roll_amplitude,
            pitch_amplitude,
            cycle_samples: cycle_samples.max(1),
            step: 0,
            one_g: f64::from(ONE_G_COUNTS),
        }
    }

    /// Raw counts for a vehicle at rest at the given attitude.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn sample_at(roll_deg: f64, pitch_deg: f64, one_g: f64) -> RawMotionSample {
        let (roll, pitch) = (roll_deg.to_radians(), pitch_deg.to_radians());
        let to_counts = |v: f64| {
            (v * one_g)
                .round()
                .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
        };
        RawMotionSample::new(
            to_counts(-pitch.sin()),
            to_counts(pitch.cos() * roll.sin()),
            to_counts(pitch.cos() * roll.cos()),
        )
    }
}

impl MotionSensor for SimulatedMotion {
    fn read_sample(&mut self) -> Option<RawMotionSample> {
        let phase = TAU * f64::from(self.step) / f64::from(self.cycle_samples);
        self.step = (self.step + 1) % self.cycle_samples;
        Some(Self::sample_at(
            self.roll_amplitude * phase.sin(),
            self.pitch_amplitude * (phase * 2.0).sin(),
            self.one_g,
        ))
    }
}

/// Synthetic microphone.
#[derive(Debug, Clone)]
pub struct SimulatedAcoustic {
    base: u16,
    spread: u16,
    rng: SmallRng,
}

impl Default for SimulatedAcoustic {
    fn default() -> Self {
        Self::new(1200, 600, 0x5EED)
    }
}

impl SimulatedAcoustic {
    /// Samples uniformly in `base ± spread`, clamped to the ADC range.
    #[must_use]
    pub fn new(base: u16, spread: u16, seed: u64) -> Self {
        Self {
            base,
            spread,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl AcousticSensor for SimulatedAcoustic {
    fn read_raw(&mut self) -> u16 {
        let low = i32::from(self.base) - i32::from(self.spread);
        let high = i32::from(self.base) + i32::from(self.spread);
        let value = self
            .rng
            .gen_range(low..=high)
            .clamp(0, i32::from(ACOUSTIC_FULL_SCALE));
        u16::try_from(value).unwrap_or(ACOUSTIC_FULL_SCALE)
    }
}
