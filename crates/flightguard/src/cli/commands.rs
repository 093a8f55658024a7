//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Arguments for `run`.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Model file (overrides `inference.model_path`)
    #[arg(short, long, value_name = "FILE")]
    pub model: Option<PathBuf>,

    /// File or serial device streaming NMEA sentences
    #[arg(short, long, value_name = "PATH")]
    pub gps: Option<PathBuf>,

    /// I2C bus with the MPU-6050, e.g. /dev/i2c-1 (simulated if unset)
    #[arg(long, value_name = "DEVICE")]
    pub i2c: Option<PathBuf>,

    /// Raw ADC attribute file for the microphone (simulated if unset)
    #[arg(long, value_name = "PATH")]
    pub mic: Option<PathBuf>,

    /// Do not write status records to the flight log
    #[arg(long)]
    pub no_record: bool,

    /// Session tag stored with each logged record (defaults to the start time)
    #[arg(long)]
    pub session: Option<String>,
}

/// Arguments for `classify`.
#[derive(Debug, Args)]
pub struct ClassifyCommand {
    /// Roll in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub roll: f32,

    /// Pitch in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub pitch: f32,

    /// Acceleration magnitude in g
    #[arg(long, default_value = "1.0")]
    pub accel: f32,

    /// Model file (overrides `inference.model_path`)
    #[arg(short, long, value_name = "FILE")]
    pub model: Option<PathBuf>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Model commands.
#[derive(Debug, Subcommand)]
pub enum ModelCommand {
    /// Load a model file and report its shape
    Check {
        /// Path to the model file
        file: PathBuf,
    },
}

/// Flight log commands.
#[derive(Debug, Subcommand)]
pub enum LogCommand {
    /// Show the most recent status records
    Recent {
        /// Number of records to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show flight log statistics
    Stats {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
