//! Linux I2C character device backend.

use std::path::Path;

use linux_embedded_hal::I2cdev;
use tracing::info;

use super::Mpu6050;
use crate::config::SensorConfig;
use crate::error::{Error, Result};

/// Open `/dev/i2c-N`, build the configured driver and wake the device.
///
/// # Errors
///
/// Returns an error if the device node cannot be opened or the sensor does
/// not acknowledge the wake write.
pub fn open_motion(path: &Path, sensor: &SensorConfig) -> Result<Mpu6050<I2cdev>> {
    let bus = I2cdev::new(path).map_err(|e| Error::device(path, e.to_string()))?;
    info!(path = %path.display(), "opened I2C bus");
    let mut driver = sensor.driver(bus);
    driver.wake()?;
    Ok(driver)
}
