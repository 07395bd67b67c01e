//! `daqgate-store` – the document store.
//!
//! A single SQLite database holds the five logical collections the service
//! reads and writes.  [`DaqStore`] implements every seam in
//! [`daqgate_types::repository`], so one handle is constructed at process
//! start and shared (behind an `Arc`) by all components.
//!
//! # Storage layout
//!
//! | table              | contents                                      |
//! |--------------------|-----------------------------------------------|
//! | `detector_control` | one commanded-intent document per detector   |
//! | `aggregate_status` | append-only detector status, by insertion seq |
//! | `status`           | append-only host status, by insertion seq     |
//! | `options`          | operating-mode catalog                        |
//! | `log`              | DAQ log entries                               |
//! | `users`            | API usernames and salted key hashes           |
//!
//! Every call holds the connection for the duration of one statement batch.
//! SQLite's busy handler waits at most the configured timeout for a lock;
//! past that the call fails with [`StoreError::Timeout`].  There is no retry.
//!
//! # Example
//!
//! ```rust
//! use daqgate_store::DaqStore;
//! use daqgate_types::ControlDocument;
//! use daqgate_types::repository::ControlRepository;
//!
//! let store = DaqStore::open_in_memory().unwrap();
//! store.create_control_document(&ControlDocument::new("tpc")).unwrap();
//! assert_eq!(store.control_document("tpc").unwrap().version, 0);
//! ```

pub mod control;
pub mod log;
pub mod options;
pub mod status;
pub mod users;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use daqgate_types::StoreError;
use rusqlite::{Connection, ErrorCode};
use tracing::info;

/// Lock wait applied to every store call unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS detector_control (
        detector   TEXT NOT NULL PRIMARY KEY,
        mode       TEXT,
        active     TEXT,
        remote     TEXT,
        link_mv    TEXT,
        link_nv    TEXT,
        stop_after TEXT,
        comment    TEXT,
        \"user\"   TEXT,
        version    INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT
    );
    CREATE TABLE IF NOT EXISTS aggregate_status (
        seq      INTEGER PRIMARY KEY AUTOINCREMENT,
        detector TEXT    NOT NULL,
        status   INTEGER NOT NULL,
        number   INTEGER NOT NULL DEFAULT 0,
        rate     REAL    NOT NULL DEFAULT 0,
        readers  INTEGER NOT NULL DEFAULT 0,
        time     TEXT    NOT NULL,
        buff     REAL    NOT NULL DEFAULT 0,
        mode     TEXT
    );
    CREATE INDEX IF NOT EXISTS aggregate_status_by_detector
        ON aggregate_status (detector, seq);
    CREATE TABLE IF NOT EXISTS status (
        seq           INTEGER PRIMARY KEY AUTOINCREMENT,
        inserted_at   INTEGER NOT NULL,
        host          TEXT    NOT NULL,
        \"type\"      TEXT,
        status        INTEGER NOT NULL DEFAULT 0,
        rate          REAL    NOT NULL DEFAULT 0,
        buffer_length REAL    NOT NULL DEFAULT 0,
        run_mode      TEXT,
        active        TEXT    NOT NULL DEFAULT '[]'
    );
    CREATE INDEX IF NOT EXISTS status_by_host ON status (host, seq);
    CREATE TABLE IF NOT EXISTS options (
        name       TEXT NOT NULL PRIMARY KEY,
        definition TEXT
    );
    CREATE TABLE IF NOT EXISTS log (
        seq      INTEGER PRIMARY KEY AUTOINCREMENT,
        message  TEXT    NOT NULL,
        \"user\" TEXT,
        priority INTEGER NOT NULL,
        time     TEXT    NOT NULL
    );
    CREATE INDEX IF NOT EXISTS log_by_priority ON log (priority, seq);
    CREATE TABLE IF NOT EXISTS users (
        api_username TEXT NOT NULL PRIMARY KEY,
        api_key      TEXT NOT NULL
    );
";

/// SQLite-backed implementation of every storage seam.
pub struct DaqStore {
    conn: Mutex<Connection>,
    timeout: Duration,
}

impl DaqStore {
    /// Open (or create) a persistent store at `path` with the given lock
    /// timeout.
    pub fn open(path: impl AsRef<Path>, timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        let store = Self::from_connection(conn, timeout)?;
        info!(path = %path.display(), ?timeout, "opened DAQ store");
        Ok(store)
    }

    /// Open a temporary in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Backend(e.to_string()))?;
        Self::from_connection(conn, DEFAULT_TIMEOUT)
    }

    fn from_connection(conn: Connection, timeout: Duration) -> Result<Self, StoreError> {
        conn.busy_timeout(timeout)
            .and_then(|_| conn.execute_batch(SCHEMA))
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `f` against the connection, classifying any SQLite failure.
    pub(crate) fn with_conn<T>(
        &self,
        collection: &'static str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("store connection mutex poisoned".into()))?;
        f(&conn).map_err(|e| self.classify(collection, e))
    }

    fn classify(&self, collection: &'static str, err: rusqlite::Error) -> StoreError {
        match err {
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => StoreError::Corrupt {
                collection,
                details: err.to_string(),
            },
            other => match other.sqlite_error_code() {
                Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                    StoreError::Timeout(self.timeout)
                }
                _ => StoreError::Backend(other.to_string()),
            },
        }
    }
}

pub(crate) fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339()
}

/// Decode an RFC-3339 column, reporting failures the way rusqlite reports
/// any other conversion error.
pub(crate) fn decode_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
