//! Acoustic amplitude from a raw ADC attribute file.
//!
//! Linux IIO drivers expose each channel as a text attribute such as
//! `/sys/bus/iio/devices/iio:device0/in_voltage0_raw`. Every read rewinds
//! the open file and parses the current value.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::AcousticSensor;
use crate::error::{Error, Result};

/// Raw ADC channel read through a sysfs attribute.
#[derive(Debug)]
pub struct SysfsAdc {
    path: PathBuf,
    file: File,
    text: String,
    last: u16,
    failures: u64,
}

impl SysfsAdc {
    /// Open the attribute at `path` and take a first reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or does not hold a raw
    /// sample.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| Error::device(&path, e.to_string()))?;
        let mut adc = Self {
            path,
            file,
            text: String::new(),
            last: 0,
            failures: 0,
        };
        adc.last = adc
            .read_value()
            .map_err(|message| Error::device(&adc.path, message))?;
        info!(path = %adc.path.display(), raw = adc.last, "acoustic channel open");
        Ok(adc)
    }

    /// Path of the attribute file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads that failed and repeated the previous value.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures
    }

    fn read_value(&mut self) -> std::result::Result<u16, String> {
        self.text.clear();
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| e.to_string())?;
        self.file
            .read_to_string(&mut self.text)
            .map_err(|e| e.to_string())?;
        let value = self.text.trim();
        value
            .parse::<u16>()
            .map_err(|e| format!("not a raw sample ({value:?}): {e}"))
    }
}

impl AcousticSensor for SysfsAdc {
    fn read_raw(&mut self) -> u16 {
        match self.read_value() {
            Ok(raw) => {
                self.last = raw;
                raw
            }
            Err(message) => {
                self.failures += 1;
                if self.failures.is_power_of_two() {
                    warn!(failures = self.failures, error = %message, "acoustic read failed");
                } else {
                    debug!(error = %message, "acoustic read failed");
                }
                self.last
            }
        }
    }
}
