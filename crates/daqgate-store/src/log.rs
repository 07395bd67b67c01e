//! `log` – DAQ log entries, newest first.

use daqgate_types::repository::LogSource;
use daqgate_types::{LogEntry, StoreError};
use rusqlite::params;

use crate::{DaqStore, decode_time, encode_time};

const COLLECTION: &str = "log";

impl DaqStore {
    /// Append a log entry.
    pub fn append_log(&self, entry: &LogEntry) -> Result<(), StoreError> {
        self.with_conn(COLLECTION, |conn| {
            conn.execute(
                "INSERT INTO log (message, \"user\", priority, time) VALUES (?1, ?2, ?3, ?4)",
                params![entry.message, entry.user, entry.priority, encode_time(&entry.time)],
            )
        })?;
        Ok(())
    }
}

impl LogSource for DaqStore {
    fn recent_logs(
        &self,
        min_priority: i32,
        below_priority: i32,
        limit: usize,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(COLLECTION, |conn| {
            let mut stmt = conn.prepare(
                "SELECT message, \"user\", priority, time FROM log
                 WHERE priority >= ?1 AND priority < ?2
                 ORDER BY seq DESC LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![min_priority, below_priority, limit], |row| {
                let time: String = row.get(3)?;
                Ok(LogEntry {
                    message: row.get(0)?,
                    user: row.get(1)?,
                    priority: row.get(2)?,
                    time: decode_time(3, &time)?,
                })
            })?;
            rows.collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(message: &str, priority: i32) -> LogEntry {
        LogEntry {
            message: message.into(),
            user: Some("daq".into()),
            priority,
            time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn filters_range_newest_first() {
        let store = DaqStore::open_in_memory().unwrap();
        for (msg, p) in [("a", 1), ("b", 3), ("c", 5), ("d", 2), ("e", 4)] {
            store.append_log(&entry(msg, p)).unwrap();
        }
        let entries = store.recent_logs(2, 5, 10).unwrap();
        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["e", "d", "b"]);
    }

    #[test]
    fn limit_caps_result() {
        let store = DaqStore::open_in_memory().unwrap();
        store.append_log(&entry("first", 3)).unwrap();
        store.append_log(&entry("second", 3)).unwrap();
        let entries = store.recent_logs(0, 5, 1).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], entry("second", 3));
    }
}
