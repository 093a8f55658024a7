//! Attitude estimation from a single accelerometer sample.
//!
//! Roll and pitch come from the gravity vector alone; there is no gyro
//! integration and no filtering. The sample must be taken while the vehicle
//! is not accelerating hard for the angles to mean anything, which is fine for
//! a tilt-based safety monitor.

use serde::{Deserialize, Serialize};

/// Raw counts per 1 g at the ±2 g accelerometer range.
pub const ONE_G_COUNTS: f32 = 16384.0;

/// One raw accelerometer sample, in ADC counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawMotionSample {
    /// X axis.
    pub x: i16,
    /// Y axis.
    pub y: i16,
    /// Z axis.
    pub z: i16,
}

impl RawMotionSample {
    /// Create a sample from its three axes.
    #[must_use]
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Decode the 6-byte accelerometer block (X, Y, Z, each big-endian).
    #[must_use]
    pub const fn from_be_bytes(block: [u8; 6]) -> Self {
        Self {
            x: i16::from_be_bytes([block[0], block[1]]),
            y: i16::from_be_bytes([block[2], block[3]]),
            z: i16::from_be_bytes([block[4], block[5]]),
        }
    }
}

/// Roll, pitch and acceleration magnitude derived from one sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    /// Roll in degrees, `(-180, 180]`.
    pub roll: f32,
    /// Pitch in degrees, `[-90, 90]`.
    pub pitch: f32,
    /// Vector magnitude in g.
    pub accel_magnitude: f32,
}

/// Converts raw samples into an [`Orientation`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationEstimator {
    one_g: f32,
}

impl Default for OrientationEstimator {
    fn default() -> Self {
        Self::new(ONE_G_COUNTS)
    }
}

impl OrientationEstimator {
    /// Create an estimator for a sensor range where `one_g` counts equal 1 g.
    #[must_use]
    pub fn new(one_g: f32) -> Self {
        Self { one_g }
    }

    /// Counts per g used for the magnitude.
    #[must_use]
    pub fn one_g(&self) -> f32 {
        self.one_g
    }

    /// Estimate attitude from one sample.
    ///
    /// `atan2(0, 0)` is 0, so a sample with `y == z == 0` has zero roll.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn estimate(&self, sample: RawMotionSample) -> Orientation {
        let x = i64::from(sample.x);
        let y = i64::from(sample.y);
        let z = i64::from(sample.z);

        // i64 keeps 3 * 32768^2 well clear of overflow
        let yz_sq = y * y + z * z;
        let norm_sq = x * x + yz_sq;

        let roll = (y as f64).atan2(z as f64).to_degrees();
        // Negate before the cast so x == 0 gives +0.0, not -0.0.
        let pitch = ((-x) as f64).atan2((yz_sq as f64).sqrt()).to_degrees();
        let magnitude = (norm_sq as f64).sqrt() / f64::from(self.one_g);

        Orientation {
            roll: roll as f32,
            pitch: pitch as f32,
            accel_magnitude: magnitude as f32,
        }
    }
}
