//! Storage seams consumed by `daqgate-kernel`.
//!
//! The kernel never talks to a database directly.  It is handed values that
//! implement these traits; `daqgate-store` provides the SQLite-backed
//! implementation and tests provide in-memory ones.  All methods are
//! synchronous; callers on an async runtime are expected to move them onto
//! a blocking thread and bound them with a timeout.

use crate::{ControlDocument, ControlUpdate, DetectorStatus, HostStatus, LogEntry, StoreError};

/// Read and conditionally update per-detector control documents.
pub trait ControlRepository: Send + Sync {
    /// Fetch the control document for `detector`.
    ///
    /// A detector without a document yields [`StoreError::NotFound`]; documents
    /// are never created implicitly.
    fn control_document(&self, detector: &str) -> Result<ControlDocument, StoreError>;

    /// Apply `update` to the document of `detector` if, and only if, its
    /// stored version still equals `expected_version`.  The store increments
    /// the version atomically with the write.
    ///
    /// # Errors
    ///
    /// - [`StoreError::VersionConflict`] – the document changed since it was read.
    /// - [`StoreError::NotFound`] – the document disappeared.
    fn apply_update(
        &self,
        detector: &str,
        expected_version: u64,
        update: &ControlUpdate,
    ) -> Result<(), StoreError>;
}

/// Read access to status telemetry, newest record first.
pub trait StatusSource: Send + Sync {
    /// Most recently inserted aggregate status for `detector`.
    fn latest_detector_status(&self, detector: &str)
    -> Result<Option<DetectorStatus>, StoreError>;

    /// Most recently inserted status for `host`.
    fn latest_host_status(&self, host: &str) -> Result<Option<HostStatus>, StoreError>;

    /// Every status for `host` inserted at or after the unix second
    /// `since_unix`, newest first.
    fn host_status_since(&self, host: &str, since_unix: i64)
    -> Result<Vec<HostStatus>, StoreError>;
}

/// Catalog of known operating modes.
pub trait OptionsCatalog: Send + Sync {
    fn option_exists(&self, name: &str) -> Result<bool, StoreError>;
}

/// Read access to the DAQ log.
pub trait LogSource: Send + Sync {
    /// Entries with `min_priority <= priority < below_priority`, newest
    /// first, at most `limit` of them.
    fn recent_logs(
        &self,
        min_priority: i32,
        below_priority: i32,
        limit: usize,
    ) -> Result<Vec<LogEntry>, StoreError>;
}

/// Lookup of stored API credentials.
pub trait CredentialSource: Send + Sync {
    /// Salted hash of the API key registered for `api_user`, if any.
    fn api_key_hash(&self, api_user: &str) -> Result<Option<String>, StoreError>;
}
