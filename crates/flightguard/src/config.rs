//! Configuration for flightguard.
//!
//! Loaded with figment from defaults, then a TOML file, then environment
//! variables. Nested keys in the environment use a double underscore, e.g.
//! `FLIGHTGUARD_SAMPLING__PERIOD_MS=8`.

use std::path::PathBuf;
use std::time::Duration;

use embedded_hal::i2c::I2c;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sensors::Mpu6050;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory name under the platform config and data dirs.
const APP_DIR_NAME: &str = "flightguard";

/// Default flight log file name.
const DATABASE_FILE_NAME: &str = "flightlog.sqlite";

/// Environment variable prefix.
const ENV_PREFIX: &str = "FLIGHTGUARD_";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sampling loop.
    pub sampling: SamplingConfig,
    /// Inference loop.
    pub inference: InferenceConfig,
    /// Accelerometer.
    pub sensor: SensorConfig,
    /// Acoustic input.
    pub acoustic: AcousticConfig,
    /// Flight log.
    pub recorder: RecorderConfig,
}

/// Sampling loop timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Cycle period in milliseconds.
    pub period_ms: u64,
    /// Bound on acquiring the telemetry lock to publish, in milliseconds.
    pub publish_timeout_ms: u64,
    /// Bound on acquiring the telemetry lock to read the verdict, in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            period_ms: 10,
            publish_timeout_ms: 5,
            read_timeout_ms: 5,
        }
    }
}

/// Inference loop timing and model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Cycle period in milliseconds.
    pub period_ms: u64,
    /// Bound on acquiring the telemetry lock, in milliseconds.
    pub timeout_ms: u64,
    /// Path to the model file. Without one the classifier runs degraded.
    pub model_path: Option<PathBuf>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            period_ms: 20,
            timeout_ms: 10,
            model_path: None,
        }
    }
}

/// Accelerometer bus settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// 7-bit device address.
    pub address: u8,
    /// Register written with 0 at startup to leave sleep mode.
    pub wake_register: u8,
    /// First of the six accelerometer data registers.
    pub data_register: u8,
    /// Raw counts per 1 g.
    pub one_g: f32,
    /// I2C device node, e.g. `/dev/i2c-1`. Unset means simulated motion.
    pub bus: Option<PathBuf>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            address: crate::sensors::mpu::DEFAULT_ADDRESS,
            wake_register: crate::sensors::mpu::PWR_MGMT_1,
            data_register: crate::sensors::mpu::ACCEL_XOUT_H,
            one_g: crate::orientation::ONE_G_COUNTS,
            bus: None,
        }
    }
}

impl SensorConfig {
    /// Build a driver for this device on `i2c`.
    #[must_use]
    pub fn driver<I: I2c>(&self, i2c: I) -> Mpu6050<I> {
        Mpu6050::with_registers(i2c, self.address, self.wake_register, self.data_register)
    }
}

/// Acoustic ADC settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcousticConfig {
    /// Raw value that maps to a noise level of 100.
    pub full_scale: u16,
    /// Raw ADC attribute file. Unset means simulated noise.
    pub adc_path: Option<PathBuf>,
}

impl Default for AcousticConfig {
    fn default() -> Self {
        Self {
            full_scale: crate::sensors::ACOUSTIC_FULL_SCALE,
            adc_path: None,
        }
    }
}

/// Flight log settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Whether `run` logs status records.
    pub enabled: bool,
    /// Path to the database file.
    /// Defaults to `~/.local/share/flightguard/flightlog.sqlite`
    pub database_path: Option<PathBuf>,
    /// Records to keep. Set to 0 for unlimited.
    pub max_records: usize,
    /// Records buffered between the sampling loop and the writer.
    pub queue_depth: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: None,
            max_records: 500_000,
            queue_depth: 1_024,
        }
    }
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let config: Config = Self::figment(&config_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(config_file: &std::path::Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(APP_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let s = &self.sampling;
        let i = &self.inference;

        for (name, value) in [
            ("sampling.period_ms", s.period_ms),
            ("sampling.publish_timeout_ms", s.publish_timeout_ms),
            ("sampling.read_timeout_ms", s.read_timeout_ms),
            ("inference.period_ms", i.period_ms),
            ("inference.timeout_ms", i.timeout_ms),
        ] {
            if value == 0 {
                return Err(invalid(format!("{name} must be greater than 0")));
            }
        }

        for (name, timeout) in [
            ("sampling.publish_timeout_ms", s.publish_timeout_ms),
            ("sampling.read_timeout_ms", s.read_timeout_ms),
        ] {
            if timeout >= s.period_ms {
                return Err(invalid(format!(
                    "{name} ({timeout}) must be shorter than sampling.period_ms ({})",
                    s.period_ms
                )));
            }
        }

        if i.timeout_ms >= i.period_ms {
            return Err(invalid(format!(
                "inference.timeout_ms ({}) must be shorter than inference.period_ms ({})",
                i.timeout_ms, i.period_ms
            )));
        }

        if i.period_ms <= s.period_ms {
            return Err(invalid(format!(
                "inference.period_ms ({}) must be longer than sampling.period_ms ({})",
                i.period_ms, s.period_ms
            )));
        }

        if !(self.sensor.one_g.is_finite() && self.sensor.one_g > 0.0) {
            return Err(invalid(format!(
                "sensor.one_g must be positive, got {}",
                self.sensor.one_g
            )));
        }

        if self.acoustic.full_scale == 0 {
            return Err(invalid("acoustic.full_scale must be greater than 0"));
        }

        if self.recorder.queue_depth == 0 {
            return Err(invalid("recorder.queue_depth must be greater than 0"));
        }

        Ok(())
    }

    /// Flight log path, resolving the default if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.recorder
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Sampling loop period.
    #[must_use]
    pub fn sampling_period(&self) -> Duration {
        Duration::from_millis(self.sampling.period_ms)
    }

    /// Sampling loop publish bound.
    #[must_use]
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.sampling.publish_timeout_ms)
    }

    /// Sampling loop read bound.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.sampling.read_timeout_ms)
    }

    /// Inference loop period.
    #[must_use]
    pub fn inference_period(&self) -> Duration {
        Duration::from_millis(self.inference.period_ms)
    }

    /// Inference loop lock bound.
    #[must_use]
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference.timeout_ms)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
