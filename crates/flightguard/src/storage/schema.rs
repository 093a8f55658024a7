//! `SQLite` schema for the flight log.

/// Base table: one row per status record.
pub const CREATE_RECORDS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS status_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded_at TEXT NOT NULL,
    roll REAL NOT NULL,
    pitch REAL NOT NULL,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    alt REAL NOT NULL,
    safety_score REAL NOT NULL,
    status INTEGER NOT NULL,
    armed INTEGER NOT NULL,
    noise REAL NOT NULL,
    session TEXT
)
";

/// Index for newest-first listing.
pub const CREATE_RECORDED_AT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_records_recorded_at ON status_records(recorded_at DESC)
";

/// Index for per-tier counts.
pub const CREATE_STATUS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_records_status ON status_records(status)
";

/// Index for per-run queries.
pub const CREATE_SESSION_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_records_session ON status_records(session)
";

/// Key-value metadata, including the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Statements creating the schema.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_RECORDS_TABLE,
    CREATE_RECORDED_AT_INDEX,
    CREATE_STATUS_INDEX,
    CREATE_SESSION_INDEX,
    CREATE_METADATA_TABLE,
];
