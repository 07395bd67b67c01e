//! [`LogSeverityFilter`] – recent operational log entries.
//!
//! Priorities run 0 (debug) to 5 (user).  User entries record operator
//! actions, not faults, so they are always excluded; everything from the
//! requested minimum up to fatal is returned, newest first.

use std::sync::Arc;

use daqgate_types::repository::LogSource;
use daqgate_types::{LogEntry, Severity, StoreError};

/// Severity used when a caller does not ask for one.
pub const DEFAULT_MIN_SEVERITY: Severity = Severity::Warning;

/// Number of entries returned per call unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 1;

#[derive(Clone)]
pub struct LogSeverityFilter {
    source: Arc<dyn LogSource>,
    page_size: usize,
}

impl LogSeverityFilter {
    pub fn new(source: Arc<dyn LogSource>) -> Self {
        Self {
            source,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the page size (builder-style).  Zero is treated as one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Entries with `min <= priority < user`, newest first.
    pub fn recent(&self, min: Severity) -> Result<Vec<LogEntry>, StoreError> {
        self.source
            .recent_logs(min.code(), Severity::User.code(), self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, now};

    fn entry(message: &str, priority: i32) -> LogEntry {
        LogEntry {
            message: message.to_string(),
            user: None,
            priority,
            time: now(),
        }
    }

    fn store_with_logs() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        store.push_log(entry("buffer filling", 2));
        store.push_log(entry("reader crashed", 4));
        store.push_log(entry("operator stopped run", 5));
        store.push_log(entry("heartbeat", 0));
        store
    }

    #[test]
    fn default_page_is_the_single_newest_match() {
        let filter = LogSeverityFilter::new(store_with_logs());
        let entries = filter.recent(DEFAULT_MIN_SEVERITY).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "reader crashed");
    }

    #[test]
    fn user_entries_are_excluded() {
        let filter = LogSeverityFilter::new(store_with_logs()).with_page_size(10);
        let entries = filter.recent(Severity::Debug).unwrap();
        assert!(entries.iter().all(|e| e.priority < 5));
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn minimum_is_inclusive() {
        let filter = LogSeverityFilter::new(store_with_logs()).with_page_size(10);
        let entries = filter.recent(Severity::Warning).unwrap();
        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["reader crashed", "buffer filling"]);
    }

    #[test]
    fn user_minimum_yields_nothing() {
        let filter = LogSeverityFilter::new(store_with_logs()).with_page_size(10);
        assert!(filter.recent(Severity::User).unwrap().is_empty());
    }

    #[test]
    fn zero_page_size_is_clamped() {
        let filter = LogSeverityFilter::new(store_with_logs()).with_page_size(0);
        assert_eq!(filter.page_size(), 1);
    }
}
