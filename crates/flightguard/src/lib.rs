//! `flightguard` - an onboard flight-safety monitor
//!
//! Two periodic loops share one telemetry record. The sampling loop reads the
//! accelerometer and acoustic input, estimates roll and pitch, publishes the
//! fused reading and emits one status line per cycle. The inference loop runs
//! a learned classifier over the latest reading and publishes a safety score
//! and risk tier. Neither loop ever waits unboundedly on the other.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod intake;
pub mod logging;
pub mod orientation;
pub mod sampling;
pub mod schedule;
pub mod sensors;
pub mod status;
pub mod storage;
pub mod telemetry;

pub use classifier::{DenseModel, SafetyClassifier, SafetyModel};
pub use config::Config;
pub use error::{Error, Result};
pub use inference::InferenceLoop;
pub use logging::init_logging;
pub use orientation::{Orientation, OrientationEstimator, RawMotionSample};
pub use sampling::SamplingLoop;
pub use schedule::{spawn_periodic, PeriodicTask, TaskHandle, TaskManager};
pub use status::StatusRecord;
pub use storage::{FlightLog, LogStats};
pub use telemetry::{FusedReading, InferenceResult, SafetyStatus, TelemetryPort, TelemetryStore};
