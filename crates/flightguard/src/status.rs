//! The per-cycle status record and its line encoding.
//!
//! One record is emitted per sampling cycle as a single JSON object on its
//! own line, with fixed field order and fixed decimal precision:
//!
//! ```text
//! {"r":90.0,"p":0.0,"lat":0.000000,"lon":0.000000,"alt":0,"as":100,"st":0,"arm":0,"sd":0,"noise":0}
//! ```
//!
//! Ground tools treat any line starting with `{` and ending with `}` as a
//! record and ignore everything else.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::intake::PositionFix;
use crate::telemetry::{FusedReading, InferenceResult, SafetyStatus};

/// One status report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Roll in degrees.
    pub roll: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Latitude in degrees, 0 without a fix.
    pub lat: f64,
    /// Longitude in degrees, 0 without a fix.
    pub lon: f64,
    /// Altitude in meters, 0 without a fix.
    pub alt: f64,
    /// Safety score, 0 to 100.
    pub safety_score: f32,
    /// Risk tier.
    pub status: SafetyStatus,
    /// Whether the vehicle is armed.
    pub armed: bool,
    /// Acoustic level, 0 to 100.
    pub noise: f32,
}

impl StatusRecord {
    /// Assemble a record from one cycle's values.
    #[must_use]
    pub fn from_cycle(
        reading: &FusedReading,
        result: InferenceResult,
        fix: &PositionFix,
        armed: bool,
    ) -> Self {
        Self {
            roll: reading.roll,
            pitch: reading.pitch,
            lat: fix.latitude,
            lon: fix.longitude,
            alt: fix.altitude,
            safety_score: result.safety_score,
            status: result.status,
            armed,
            noise: reading.noise_level,
        }
    }

    /// Parse a line from the status stream.
    ///
    /// Lines that are not records (not wrapped in braces) yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the line looks like a record but does not decode.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if !(line.starts_with('{') && line.ends_with('}')) {
            return Ok(None);
        }

        let wire: WireRecord = serde_json::from_str(line)?;
        let status = SafetyStatus::from_code(wire.st)
            .ok_or_else(|| Error::internal(format!("unknown status code {}", wire.st)))?;

        Ok(Some(Self {
            roll: wire.r,
            pitch: wire.p,
            lat: wire.lat,
            lon: wire.lon,
            alt: wire.alt,
            safety_score: wire.score,
            status,
            armed: wire.arm != 0,
            noise: wire.noise,
        }))
    }
}

impl fmt::Display for StatusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"{{"r":{:.1},"p":{:.1},"lat":{:.6},"lon":{:.6},"alt":{:.0},"as":{:.0},"st":{},"arm":{},"sd":0,"noise":{:.0}}}"#,
            self.roll,
            self.pitch,
            self.lat,
            self.lon,
            self.alt,
            self.safety_score,
            self.status.code(),
            u8::from(self.armed),
            self.noise,
        )
    }
}

#[derive(Deserialize)]
struct WireRecord {
    r: f32,
    p: f32,
    lat: f64,
    lon: f64,
    alt: f64,
    #[serde(rename = "as")]
    score: f32,
    st: u8,
    arm: u8,
    noise: f32,
}
