//! Sensor backends feeding the sampling loop.
//!
//! Hardware sources are an MPU-6050 on any `embedded-hal` I2C bus and a raw
//! ADC channel read through sysfs. The simulated pair stands in when no
//! device is configured.

pub mod adc;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod mpu;
pub mod sim;

use crate::orientation::RawMotionSample;

pub use adc::SysfsAdc;
pub use mpu::Mpu6050;
pub use sim::{SimulatedAcoustic, SimulatedMotion};

/// Raw value of a 12-bit ADC at full scale.
pub const ACOUSTIC_FULL_SCALE: u16 = 4095;

/// Source of raw accelerometer samples.
pub trait MotionSensor: Send {
    /// Take one sample. `None` means the read came back short and the cycle
    /// should be skipped.
    fn read_sample(&mut self) -> Option<RawMotionSample>;
}

/// Source of raw acoustic amplitude samples.
pub trait AcousticSensor: Send {
    /// Take one raw ADC sample.
    fn read_raw(&mut self) -> u16;
}

/// Scale a raw acoustic sample to 0..100.
///
/// A full scale of 0 reads as silence.
#[must_use]
pub fn noise_level(raw: u16, full_scale: u16) -> f32 {
    if full_scale == 0 {
        return 0.0;
    }
    (f32::from(raw) * 100.0 / f32::from(full_scale)).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_level_scaling() {
        assert_eq!(noise_level(0, ACOUSTIC_FULL_SCALE), 0.0);
        assert_eq!(noise_level(ACOUSTIC_FULL_SCALE, ACOUSTIC_FULL_SCALE), 100.0);
        assert!((noise_level(2048, ACOUSTIC_FULL_SCALE) - 2048.0 / 40.95).abs() < 1e-3);
    }

    #[test]
    fn test_noise_level_clamps() {
        assert_eq!(noise_level(u16::MAX, ACOUSTIC_FULL_SCALE), 100.0);
        assert_eq!(noise_level(100, 0), 0.0);
    }
}
