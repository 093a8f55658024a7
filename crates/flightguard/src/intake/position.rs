//! GPS position from a streaming NMEA 0183 link.
//!
//! Only GGA and RMC sentences are decoded, from any talker (`GP`, `GN`, ...).
//! A sentence carrying a `*hh` checksum is dropped if the checksum does not
//! match. The last valid position is kept; before the first valid fix every
//! field is zero.

use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::source::{take_lines, ByteSource};

/// Longest NMEA sentence is 82 characters; leave headroom for noise.
const MAX_SENTENCE: usize = 128;

/// Last-known position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionFix {
    /// Latitude in degrees, north positive.
    pub latitude: f64,
    /// Longitude in degrees, east positive.
    pub longitude: f64,
    /// Altitude above mean sea level in meters.
    pub altitude: f64,
    /// GGA fix quality (0 = none, 1 = GPS, 2 = DGPS, ...).
    pub quality: u8,
    /// Satellites in use, from GGA.
    pub satellites: u8,
    /// UTC time of the last GGA fix.
    pub time: Option<NaiveTime>,
}

impl PositionFix {
    /// Whether any valid fix has been seen.
    #[must_use]
    pub fn has_fix(&self) -> bool {
        self.quality > 0
    }
}

/// A decoded sentence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sentence {
    /// Global positioning fix data.
    Gga {
        /// UTC time.
        time: Option<NaiveTime>,
        /// Latitude and longitude, if present.
        position: Option<(f64, f64)>,
        /// Fix quality.
        quality: u8,
        /// Satellites in use.
        satellites: u8,
        /// Altitude in meters, if present.
        altitude: Option<f64>,
    },
    /// Recommended minimum data.
    Rmc {
        /// Whether the receiver flagged the data valid (`A`).
        valid: bool,
        /// Latitude and longitude, if present.
        position: Option<(f64, f64)>,
    },
}

/// Why a sentence was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SentenceError {
    /// Not an NMEA sentence.
    #[error("malformed sentence")]
    Malformed,
    /// The `*hh` checksum did not match.
    #[error("checksum mismatch")]
    Checksum,
    /// A sentence type this intake does not decode.
    #[error("unsupported sentence")]
    Unsupported,
}

/// Decode one sentence, with or without its trailing checksum.
///
/// # Errors
///
/// Returns a [`SentenceError`] describing why the sentence was rejected.
pub fn parse_sentence(line: &str) -> Result<Sentence, SentenceError> {
    let line = line.trim();
    let body = line.strip_prefix('$').ok_or(SentenceError::Malformed)?;

    let body = match body.split_once('*') {
        Some((body, checksum)) => {
            let expected =
                u8::from_str_radix(checksum.trim(), 16).map_err(|_| SentenceError::Malformed)?;
            let actual = body.bytes().fold(0_u8, |acc, b| acc ^ b);
            if actual != expected {
                return Err(SentenceError::Checksum);
            }
            body
        }
        None => body,
    };

    let fields: Vec<&str> = body.split(',').collect();
    let kind = fields.first().ok_or(SentenceError::Malformed)?;
    if kind.len() != 5 || !kind.is_ascii() {
        return Err(SentenceError::Malformed);
    }

    let field = |i: usize| fields.get(i).copied().unwrap_or("");
    match &kind[2..] {
        "GGA" => Ok(Sentence::Gga {
            time: parse_time(field(1)),
            position: parse_position(field(2), field(3), field(4), field(5)),
            quality: field(6).parse().unwrap_or(0),
            satellites: field(7).parse().unwrap_or(0),
            altitude: field(9).parse().ok().filter(|alt: &f64| alt.is_finite()),
        }),
        "RMC" => Ok(Sentence::Rmc {
            valid: field(2) == "A",
            position: parse_position(field(3), field(4), field(5), field(6)),
        }),
        _ => Err(SentenceError::Unsupported),
    }
}

/// `hhmmss[.sss]` to a time of day.
fn parse_time(field: &str) -> Option<NaiveTime> {
    if field.len() < 6 || !field.is_ascii() || !field.bytes().take(6).all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let hour = field[0..2].parse().ok()?;
    let minute = field[2..4].parse().ok()?;
    let seconds: f64 = field[4..].parse().ok()?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let millis = ((seconds.fract() * 1000.0).round() as u32).min(999);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let second = seconds.trunc() as u32;
    NaiveTime::from_hms_milli_opt(hour, minute, second, millis)
}

/// `(d)ddmm.mmmm` plus hemisphere to signed degrees.
fn parse_coordinate(value: &str, hemisphere: &str) -> Option<f64> {
    if !value.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    let raw: f64 = value.parse().ok().filter(|raw: &f64| raw.is_finite())?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    match hemisphere {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

fn parse_position(lat: &str, ns: &str, lon: &str, ew: &str) -> Option<(f64, f64)> {
    Some((parse_coordinate(lat, ns)?, parse_coordinate(lon, ew)?))
}

/// Tracks the last-known position from NMEA bytes.
pub struct PositionIntake {
    source: Box<dyn ByteSource>,
    buffer: Vec<u8>,
    fix: PositionFix,
    accepted: u64,
    rejected: u64,
}

impl fmt::Debug for PositionIntake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionIntake")
            .field("fix", &self.fix)
            .field("accepted", &self.accepted)
            .field("rejected", &self.rejected)
            .finish_non_exhaustive()
    }
}

impl PositionIntake {
    /// Create an intake reading from `source`.
    #[must_use]
    pub fn new(source: Box<dyn ByteSource>) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            fix: PositionFix::default(),
            accepted: 0,
            rejected: 0,
        }
    }

    /// Last-known position. All zeros before the first fix.
    #[must_use]
    pub fn fix(&self) -> PositionFix {
        self.fix
    }

    /// Sentences decoded and applied so far.
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Sentences dropped for a bad checksum or bad framing.
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Drain pending bytes and apply every complete sentence.
    pub fn poll(&mut self) -> PositionFix {
        self.source.drain_into(&mut self.buffer);
        for line in take_lines(&mut self.buffer, MAX_SENTENCE) {
            if line.trim().is_empty() {
                continue;
            }
            match parse_sentence(&line) {
                Ok(sentence) => {
                    self.accepted += 1;
                    self.apply(sentence);
                }
                Err(SentenceError::Unsupported) => {}
                Err(e) => {
                    self.rejected += 1;
                    trace!(error = %e, sentence = %line, "dropped NMEA sentence");
                }
            }
        }
        self.fix
    }

    /// Apply a decoded sentence to the last-known fix.
    pub fn apply(&mut self, sentence: Sentence) {
        match sentence {
            Sentence::Gga {
                time,
                position,
                quality,
                satellites,
                altitude,
            } => {
                if quality == 0 {
                    return;
                }
                let had_fix = self.fix.has_fix();
                if let Some((lat, lon)) = position {
                    self.fix.latitude = lat;
                    self.fix.longitude = lon;
                }
                if let Some(alt) = altitude {
                    self.fix.altitude = alt;
                }
                self.fix.quality = quality;
                self.fix.satellites = satellites;
                self.fix.time = time;
                if !had_fix {
                    debug!(
                        lat = self.fix.latitude,
                        lon = self.fix.longitude,
                        "first position fix"
                    );
                }
            }
            Sentence::Rmc {
                valid: true,
                position: Some((lat, lon)),
            } => {
                self.fix.latitude = lat;
                self.fix.longitude = lon;
            }
            Sentence::Rmc { .. } => {}
        }
    }
}
