//! [`StatusAccessor`] – latest-status reads with a staleness bound.
//!
//! The aggregate pipeline appends a [`DetectorStatus`] record every few
//! seconds.  A record is only evidence of the detector's state while it is
//! young: once `now - record.time` exceeds the [`StalenessBound`] the record
//! is reported as [`StatusError::Stale`] and must not be read as IDLE.
//!
//! Ages are measured in whole seconds.  With a 30 s bound a record observed
//! 30 s ago is still fresh; one observed 31 s ago is stale.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use daqgate_types::repository::StatusSource;
use daqgate_types::{DetectorStatus, HostStatus, StatusError};
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// StalenessBound
// ────────────────────────────────────────────────────────────────────────────

/// Maximum age, in seconds, for a status record to be considered
/// authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessBound {
    /// Any record is accepted regardless of age.
    Unbounded,
    /// Records older than this many seconds are stale.
    Seconds(i64),
}

impl StalenessBound {
    /// A bound of zero or less disables the freshness check.
    pub fn from_secs(secs: i64) -> Self {
        if secs > 0 {
            StalenessBound::Seconds(secs)
        } else {
            StalenessBound::Unbounded
        }
    }

    /// Return the record's age when it violates the bound.
    pub fn violation(&self, record: &DetectorStatus, now: DateTime<Utc>) -> Option<i64> {
        match *self {
            StalenessBound::Unbounded => None,
            StalenessBound::Seconds(max) => {
                let age = record.age_secs(now);
                (age > max).then_some(age)
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Host readouts
// ────────────────────────────────────────────────────────────────────────────

/// Result of a host status query.
#[derive(Debug, Clone, PartialEq)]
pub enum HostStatusReadout {
    /// The single most recent record.
    Latest(HostStatus),
    /// Every record inside the requested window, newest first.
    Window(Vec<HostStatus>),
}

// ────────────────────────────────────────────────────────────────────────────
// StatusAccessor
// ────────────────────────────────────────────────────────────────────────────

/// Reads status telemetry through a [`StatusSource`].
#[derive(Clone)]
pub struct StatusAccessor {
    source: Arc<dyn StatusSource>,
}

impl StatusAccessor {
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self { source }
    }

    /// Latest aggregate status for `detector`, validated against `bound`.
    ///
    /// # Errors
    ///
    /// - [`StatusError::NoStatus`] – no record was ever inserted.
    /// - [`StatusError::Stale`] – the latest record is older than `bound`;
    ///   the record travels inside the error for diagnostics.
    /// - [`StatusError::Store`] – the source failed.
    pub fn latest_detector_status(
        &self,
        detector: &str,
        bound: StalenessBound,
        now: DateTime<Utc>,
    ) -> Result<DetectorStatus, StatusError> {
        let record = self
            .source
            .latest_detector_status(detector)?
            .ok_or_else(|| StatusError::NoStatus(detector.to_string()))?;

        if let Some(age_secs) = bound.violation(&record, now) {
            debug!(detector, age_secs, "latest detector status is stale");
            return Err(StatusError::Stale {
                record: Box::new(record),
                age_secs,
            });
        }
        Ok(record)
    }

    /// Host status for `/getstatus`.
    ///
    /// A `window_secs` of zero or less returns the single latest record.  A
    /// positive window returns every record inserted during the last
    /// `window_secs` seconds.  The boundary is the insertion second of each
    /// record, not the observation time carried in the document.
    pub fn host_status(
        &self,
        host: &str,
        window_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<HostStatusReadout, StatusError> {
        if window_secs <= 0 {
            return self
                .source
                .latest_host_status(host)?
                .map(HostStatusReadout::Latest)
                .ok_or_else(|| StatusError::NoHostStatus(host.to_string()));
        }

        let since = now.timestamp() - window_secs;
        let records = self.source.host_status_since(host, since)?;
        if records.is_empty() {
            return Err(StatusError::NoHostStatus(host.to_string()));
        }
        Ok(HostStatusReadout::Window(records))
    }
}
