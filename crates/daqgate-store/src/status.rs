//! `aggregate_status` and `status` – append-only telemetry.
//!
//! "Latest" always means highest insertion sequence, never the largest
//! observation time.  Host status rows also record the unix second at which
//! they were inserted; window queries compare against that second only.

use chrono::{DateTime, Utc};
use daqgate_types::repository::StatusSource;
use daqgate_types::{DetectorStatus, HostStatus, StoreError};
use rusqlite::{OptionalExtension, params};

use crate::{DaqStore, decode_time, encode_time};

const AGGREGATE: &str = "aggregate_status";
const HOST: &str = "status";

const HOST_COLUMNS: &str =
    "host, \"type\", status, rate, buffer_length, run_mode, active";

impl DaqStore {
    /// Append an aggregate status record.
    pub fn insert_detector_status(&self, status: &DetectorStatus) -> Result<(), StoreError> {
        self.with_conn(AGGREGATE, |conn| {
            conn.execute(
                "INSERT INTO aggregate_status
                    (detector, status, number, rate, readers, time, buff, mode)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    status.detector,
                    status.status,
                    status.number,
                    status.rate,
                    status.readers,
                    encode_time(&status.time),
                    status.buffer,
                    status.mode,
                ],
            )
        })?;
        Ok(())
    }

    /// Append a host status record, stamped with its insertion time.
    pub fn insert_host_status(
        &self,
        status: &HostStatus,
        inserted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let active = serde_json::to_string(&status.active).map_err(|e| StoreError::Corrupt {
            collection: HOST,
            details: e.to_string(),
        })?;
        self.with_conn(HOST, |conn| {
            conn.execute(
                "INSERT INTO status
                    (inserted_at, host, \"type\", status, rate, buffer_length, run_mode, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    inserted_at.timestamp(),
                    status.host,
                    status.kind,
                    status.status,
                    status.rate,
                    status.buffer_length,
                    status.run_mode,
                    active,
                ],
            )
        })?;
        Ok(())
    }
}

impl StatusSource for DaqStore {
    fn latest_detector_status(
        &self,
        detector: &str,
    ) -> Result<Option<DetectorStatus>, StoreError> {
        self.with_conn(AGGREGATE, |conn| {
            conn.query_row(
                "SELECT detector, status, number, rate, readers, time, buff, mode
                 FROM aggregate_status WHERE detector = ?1
                 ORDER BY seq DESC LIMIT 1",
                params![detector],
                row_to_detector_status,
            )
            .optional()
        })
    }

    fn latest_host_status(&self, host: &str) -> Result<Option<HostStatus>, StoreError> {
        self.with_conn(HOST, |conn| {
            conn.query_row(
                &format!(
                    "SELECT {HOST_COLUMNS} FROM status WHERE host = ?1
                     ORDER BY seq DESC LIMIT 1"
                ),
                params![host],
                row_to_host_status,
            )
            .optional()
        })
    }

    fn host_status_since(
        &self,
        host: &str,
        since_unix: i64,
    ) -> Result<Vec<HostStatus>, StoreError> {
        self.with_conn(HOST, |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {HOST_COLUMNS} FROM status
                 WHERE host = ?1 AND inserted_at >= ?2
                 ORDER BY seq DESC"
            ))?;
            let rows = stmt.query_map(params![host, since_unix], row_to_host_status)?;
            rows.collect()
        })
    }
}

fn row_to_detector_status(row: &rusqlite::Row<'_>) -> rusqlite::Result<DetectorStatus> {
    let time: String = row.get(5)?;
    Ok(DetectorStatus {
        detector: row.get(0)?,
        status: row.get(1)?,
        number: row.get(2)?,
        rate: row.get(3)?,
        readers: row.get(4)?,
        time: decode_time(5, &time)?,
        buffer: row.get(6)?,
        mode: row.get(7)?,
    })
}

fn row_to_host_status(row: &rusqlite::Row<'_>) -> rusqlite::Result<HostStatus> {
    let active: String = row.get(6)?;
    let active = serde_json::from_str(&active).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(HostStatus {
        host: row.get(0)?,
        kind: row.get(1)?,
        status: row.get(2)?,
        rate: row.get(3)?,
        buffer_length: row.get(4)?,
        run_mode: row.get(5)?,
        active,
    })
}
