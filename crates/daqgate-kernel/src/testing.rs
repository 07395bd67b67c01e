//! In-memory implementations of the storage seams for kernel tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use daqgate_types::repository::{
    ControlRepository, CredentialSource, LogSource, OptionsCatalog, StatusSource,
};
use daqgate_types::{
    ControlDocument, ControlUpdate, DetectorStatus, Flag, HostStatus, LogEntry, StoreError,
};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn detector_status(detector: &str, status: i32, time: DateTime<Utc>) -> DetectorStatus {
    DetectorStatus {
        detector: detector.to_string(),
        status,
        number: 7,
        rate: 12.5,
        readers: 3,
        time,
        buffer: 0.0,
        mode: None,
    }
}

pub fn host_status(host: &str, status: i32) -> HostStatus {
    HostStatus {
        host: host.to_string(),
        kind: Some("reader".into()),
        status,
        rate: 1.0,
        buffer_length: 0.0,
        run_mode: None,
        active: Vec::new(),
    }
}

/// A control document that passes every gate for activation.
pub fn idle_remote_doc(detector: &str) -> ControlDocument {
    let mut doc = ControlDocument::new(detector);
    doc.remote_control_enabled = Flag::True;
    doc
}

#[derive(Default)]
pub struct MemoryStore {
    controls: Mutex<HashMap<String, ControlDocument>>,
    detector_statuses: Mutex<Vec<DetectorStatus>>,
    host_statuses: Mutex<Vec<(i64, HostStatus)>>,
    options: Mutex<HashSet<String>>,
    logs: Mutex<Vec<LogEntry>>,
    users: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
    read_failure: Mutex<Option<fn() -> StoreError>>,
}

impl MemoryStore {
    pub fn put_control(&self, doc: ControlDocument) {
        self.controls
            .lock()
            .unwrap()
            .insert(doc.detector.clone(), doc);
    }

    pub fn control(&self, detector: &str) -> Option<ControlDocument> {
        self.controls.lock().unwrap().get(detector).cloned()
    }

    pub fn push_detector_status(&self, status: DetectorStatus) {
        self.detector_statuses.lock().unwrap().push(status);
    }

    pub fn push_host_status(&self, status: HostStatus, inserted_at: i64) {
        self.host_statuses
            .lock()
            .unwrap()
            .push((inserted_at, status));
    }

    pub fn add_option(&self, name: &str) {
        self.options.lock().unwrap().insert(name.to_string());
    }

    pub fn push_log(&self, entry: LogEntry) {
        self.logs.lock().unwrap().push(entry);
    }

    pub fn add_user(&self, user: &str, hash: &str) {
        self.users
            .lock()
            .unwrap()
            .insert(user.to_string(), hash.to_string());
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self) {
        *self.read_failure.lock().unwrap() =
            Some(|| StoreError::Backend("connection refused".into()));
    }

    pub fn time_out_reads(&self) {
        *self.read_failure.lock().unwrap() =
            Some(|| StoreError::Timeout(Duration::from_secs(30)));
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        match *self.read_failure.lock().unwrap() {
            Some(failure) => Err(failure()),
            None => Ok(()),
        }
    }
}

impl ControlRepository for MemoryStore {
    fn control_document(&self, detector: &str) -> Result<ControlDocument, StoreError> {
        self.check_reads()?;
        self.control(detector).ok_or_else(|| StoreError::NotFound {
            collection: "control",
            key: detector.to_string(),
        })
    }

    fn apply_update(
        &self,
        detector: &str,
        expected_version: u64,
        update: &ControlUpdate,
    ) -> Result<(), StoreError> {
        let mut controls = self.controls.lock().unwrap();
        let current = controls.get(detector).ok_or_else(|| StoreError::NotFound {
            collection: "control",
            key: detector.to_string(),
        })?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                detector: detector.to_string(),
                expected: expected_version,
            });
        }
        let next = update.apply_to(current);
        controls.insert(detector.to_string(), next);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl StatusSource for MemoryStore {
    fn latest_detector_status(
        &self,
        detector: &str,
    ) -> Result<Option<DetectorStatus>, StoreError> {
        self.check_reads()?;
        Ok(self
            .detector_statuses
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.detector == detector)
            .cloned())
    }

    fn latest_host_status(&self, host: &str) -> Result<Option<HostStatus>, StoreError> {
        self.check_reads()?;
        Ok(self
            .host_statuses
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(_, s)| s.host == host)
            .map(|(_, s)| s.clone()))
    }

    fn host_status_since(
        &self,
        host: &str,
        since_unix: i64,
    ) -> Result<Vec<HostStatus>, StoreError> {
        self.check_reads()?;
        Ok(self
            .host_statuses
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|(at, s)| s.host == host && *at >= since_unix)
            .map(|(_, s)| s.clone())
            .collect())
    }
}

impl OptionsCatalog for MemoryStore {
    fn option_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.check_reads()?;
        Ok(self.options.lock().unwrap().contains(name))
    }
}

impl LogSource for MemoryStore {
    fn recent_logs(
        &self,
        min_priority: i32,
        below_priority: i32,
        limit: usize,
    ) -> Result<Vec<LogEntry>, StoreError> {
        self.check_reads()?;
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|e| e.priority >= min_priority && e.priority < below_priority)
            .take(limit)
            .cloned()
            .collect())
    }
}

impl CredentialSource for MemoryStore {
    fn api_key_hash(&self, api_user: &str) -> Result<Option<String>, StoreError> {
        self.check_reads()?;
        Ok(self.users.lock().unwrap().get(api_user).cloned())
    }
}
