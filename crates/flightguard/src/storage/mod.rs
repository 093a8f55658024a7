//! Flight log: `SQLite` persistence for status records.
//!
//! The sampling loop never touches the database. Records reach it through a
//! bounded queue (see [`recorder`]) drained on a blocking worker.

pub mod migrations;
pub mod recorder;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::status::StatusRecord;
use crate::telemetry::SafetyStatus;

pub use recorder::{run_recorder, RecordSink, RecorderSummary};

/// A status record with its log metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedRecord {
    /// Row ID, set once stored.
    pub id: Option<i64>,
    /// When the sampling loop produced the record.
    pub recorded_at: DateTime<Utc>,
    /// Run identifier, if the producer set one.
    pub session: Option<String>,
    /// The record itself.
    pub record: StatusRecord,
}

impl LoggedRecord {
    /// Stamp a record with the current time.
    #[must_use]
    pub fn now(record: StatusRecord, session: Option<String>) -> Self {
        Self {
            id: None,
            recorded_at: Utc::now(),
            session,
            record,
        }
    }
}

/// Persistent store of status records.
#[derive(Debug)]
pub struct FlightLog {
    path: PathBuf,
    conn: Connection,
}

impl FlightLog {
    /// Open or create a log at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening flight log at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Flight log opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Open a throwaway in-memory log.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store one record and return its row ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert(&self, entry: &LoggedRecord) -> Result<i64> {
        let r = &entry.record;
        self.conn.execute(
            r"
            INSERT INTO status_records
                (recorded_at, session, roll, pitch, lat, lon, alt, safety_score, status, armed, noise)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
            params![
                entry.recorded_at.to_rfc3339(),
                entry.session,
                f64::from(r.roll),
                f64::from(r.pitch),
                r.lat,
                r.lon,
                r.alt,
                f64::from(r.safety_score),
                r.status.code(),
                r.armed,
                f64::from(r.noise),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Store a batch in one transaction. Returns how many were stored.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; the batch is rolled back.
    pub fn insert_batch(&mut self, entries: &[LoggedRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r"
                INSERT INTO status_records
                    (recorded_at, session, roll, pitch, lat, lon, alt, safety_score, status, armed, noise)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ",
            )?;
            for entry in entries {
                let r = &entry.record;
                stmt.execute(params![
                    entry.recorded_at.to_rfc3339(),
                    entry.session,
                    f64::from(r.roll),
                    f64::from(r.pitch),
                    r.lat,
                    r.lon,
                    r.alt,
                    f64::from(r.safety_score),
                    r.status.code(),
                    r.armed,
                    f64::from(r.noise),
                ])?;
            }
        }
        tx.commit()?;
        Ok(entries.len())
    }

    /// Most recent records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn recent(&self, limit: usize) -> Result<Vec<LoggedRecord>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, recorded_at, session, roll, pitch, lat, lon, alt, safety_score, status, armed, noise
            FROM status_records ORDER BY recorded_at DESC, id DESC LIMIT ?1
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map([limit_i64], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Total number of stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM status_records", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete all but the newest `keep_count` records.
    ///
    /// Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn prune_keep_recent(&self, keep_count: usize) -> Result<usize> {
        let keep_i64 = i64::try_from(keep_count).unwrap_or(i64::MAX);
        let affected = self.conn.execute(
            r"
            DELETE FROM status_records WHERE id NOT IN (
                SELECT id FROM status_records ORDER BY recorded_at DESC, id DESC LIMIT ?1
            )
            ",
            [keep_i64],
        )?;

        if affected > 0 {
            debug!("Pruned {} records to keep {} recent", affected, keep_count);
        }
        Ok(affected)
    }

    /// Summary of the log contents.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn stats(&self) -> Result<LogStats> {
        let total_records = self.count()?;

        let mut by_status = [0_i64; 3];
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM status_records GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, u8>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (code, n) = row?;
            match by_status.get_mut(usize::from(code)) {
                Some(slot) => *slot = n,
                None => warn!(code, "unknown status code in flight log"),
            }
        }

        let (min_score, mean_score): (Option<f64>, Option<f64>) = self.conn.query_row(
            "SELECT MIN(safety_score), AVG(safety_score) FROM status_records",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let first: Option<String> = self
            .conn
            .query_row(
                "SELECT recorded_at FROM status_records ORDER BY recorded_at ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let last: Option<String> = self
            .conn
            .query_row(
                "SELECT recorded_at FROM status_records ORDER BY recorded_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let parse = |s: String| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        };

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(LogStats {
            total_records,
            nominal_records: by_status[0],
            caution_records: by_status[1],
            critical_records: by_status[2],
            min_safety_score: min_score,
            mean_safety_score: mean_score,
            first_record: first.and_then(parse),
            last_record: last.and_then(parse),
            db_size_bytes,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<LoggedRecord> {
        let recorded_at: String = row.get(1)?;
        let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
            .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));

        let code: u8 = row.get(9)?;
        let status = SafetyStatus::from_code(code).unwrap_or_else(|| {
            warn!(code, "unknown status code in flight log, reading as critical");
            SafetyStatus::Critical
        });

        Ok(LoggedRecord {
            id: Some(row.get(0)?),
            recorded_at,
            session: row.get(2)?,
            record: StatusRecord {
                roll: row.get::<_, f64>(3)? as f32,
                pitch: row.get::<_, f64>(4)? as f32,
                lat: row.get(5)?,
                lon: row.get(6)?,
                alt: row.get(7)?,
                safety_score: row.get::<_, f64>(8)? as f32,
                status,
                armed: row.get(10)?,
                noise: row.get::<_, f64>(11)? as f32,
            },
        })
    }
}

/// Summary of a flight log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogStats {
    /// Total records stored.
    pub total_records: i64,
    /// Records with nominal status.
    pub nominal_records: i64,
    /// Records with caution status.
    pub caution_records: i64,
    /// Records with critical status.
    pub critical_records: i64,
    /// Lowest safety score seen.
    pub min_safety_score: Option<f64>,
    /// Mean safety score.
    pub mean_safety_score: Option<f64>,
    /// Timestamp of the oldest record.
    pub first_record: Option<DateTime<Utc>>,
    /// Timestamp of the newest record.
    pub last_record: Option<DateTime<Utc>>,
    /// Database file size in bytes.
    pub db_size_bytes: u64,
}
