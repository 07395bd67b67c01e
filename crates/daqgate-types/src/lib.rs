//! `daqgate-types` – shared documents and error taxonomy.
//!
//! Every crate in the workspace speaks in terms of the documents defined
//! here: the per-detector [`ControlDocument`] (commanded intent), the
//! [`DetectorStatus`] and [`HostStatus`] telemetry records, and
//! [`LogEntry`] rows.  The storage seams consumed by the kernel live in
//! [`repository`].

pub mod repository;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Status code reported by the aggregate pipeline when a detector is idle.
/// It is the only code in which an activation may be issued.
pub const IDLE_STATUS: i32 = 0;

// ────────────────────────────────────────────────────────────────────────────
// Flag
// ────────────────────────────────────────────────────────────────────────────

/// Tri-state control flag.
///
/// Control documents store their flags as the literal strings `"true"` and
/// `"false"`.  Anything else, including a missing field, decodes to
/// [`Flag::Unknown`], which no gate ever treats as `False`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flag {
    True,
    False,
    #[default]
    Unknown,
}

impl Flag {
    /// Decode a stored value.
    pub fn from_stored(raw: Option<&str>) -> Self {
        match raw {
            Some("true") => Flag::True,
            Some("false") => Flag::False,
            _ => Flag::Unknown,
        }
    }

    /// Encode for storage.  `Unknown` is stored as NULL.
    pub fn as_stored(self) -> Option<&'static str> {
        match self {
            Flag::True => Some("true"),
            Flag::False => Some("false"),
            Flag::Unknown => None,
        }
    }

    pub fn is_true(self) -> bool {
        self == Flag::True
    }

    pub fn is_false(self) -> bool {
        self == Flag::False
    }

    pub fn is_unknown(&self) -> bool {
        *self == Flag::Unknown
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        if value { Flag::True } else { Flag::False }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_stored().unwrap_or("unknown"))
    }
}

impl Serialize for Flag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_stored() {
            Some(s) => serializer.serialize_str(s),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(Flag::from_stored(raw.as_deref()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Control documents
// ────────────────────────────────────────────────────────────────────────────

/// Commanded intent for a single detector.  Exactly one exists per detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlDocument {
    pub detector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Flag::is_unknown")]
    pub active: Flag,
    #[serde(rename = "remote", default, skip_serializing_if = "Flag::is_unknown")]
    pub remote_control_enabled: Flag,
    /// Joint operation with the muon veto.
    #[serde(rename = "link_mv", default, skip_serializing_if = "Flag::is_unknown")]
    pub linked_to_mv: Flag,
    /// Joint operation with the neutron veto.
    #[serde(rename = "link_nv", default, skip_serializing_if = "Flag::is_unknown")]
    pub linked_to_nv: Flag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Optimistic-concurrency token, bumped by the store on every update.
    #[serde(default)]
    pub version: u64,
}

impl ControlDocument {
    /// A fresh, inactive, unlinked document for `detector`.
    pub fn new(detector: &str) -> Self {
        Self {
            detector: detector.to_string(),
            mode: None,
            active: Flag::False,
            remote_control_enabled: Flag::False,
            linked_to_mv: Flag::False,
            linked_to_nv: Flag::False,
            stop_after: None,
            comment: None,
            user: None,
            version: 0,
        }
    }

    pub fn is_unlinked(&self) -> bool {
        self.linked_to_mv.is_false() && self.linked_to_nv.is_false()
    }
}

/// Field-level partial update applied to a [`ControlDocument`].
///
/// Only the fields named by each variant are touched; everything else keeps
/// its stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlUpdate {
    /// Sets `active = "false"` and `user`.
    Deactivate { user: String },
    /// Sets `active = "true"`, `mode`, `stop_after`, `comment`, `user` and
    /// clears both joint-operation links.
    Activate {
        mode: String,
        stop_after: Option<String>,
        comment: Option<String>,
        user: String,
    },
}

impl ControlUpdate {
    pub fn user(&self) -> &str {
        match self {
            ControlUpdate::Deactivate { user } | ControlUpdate::Activate { user, .. } => user,
        }
    }

    /// The document that results from applying this update to `current`.
    /// The version is bumped the same way the store bumps it.
    pub fn apply_to(&self, current: &ControlDocument) -> ControlDocument {
        let mut next = current.clone();
        match self {
            ControlUpdate::Deactivate { user } => {
                next.active = Flag::False;
                next.user = Some(user.clone());
            }
            ControlUpdate::Activate {
                mode,
                stop_after,
                comment,
                user,
            } => {
                next.active = Flag::True;
                next.mode = Some(mode.clone());
                next.stop_after = stop_after.clone();
                next.comment = comment.clone();
                next.user = Some(user.clone());
                next.linked_to_mv = Flag::False;
                next.linked_to_nv = Flag::False;
            }
        }
        next.version = current.version + 1;
        next
    }
}

/// What the operator asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionIntent {
    Activate {
        mode: String,
        stop_after: Option<String>,
        comment: Option<String>,
    },
    Deactivate,
}

impl TransitionIntent {
    pub fn is_activation(&self) -> bool {
        matches!(self, TransitionIntent::Activate { .. })
    }
}

/// A validated transition request, ready for admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub detector: String,
    pub intent: TransitionIntent,
    /// Identity of the authenticated API user issuing the request.
    pub user: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Status documents
// ────────────────────────────────────────────────────────────────────────────

/// Aggregate status of a detector, appended by the status pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorStatus {
    pub detector: String,
    pub status: i32,
    #[serde(default)]
    pub number: i32,
    #[serde(default)]
    pub rate: f64,
    #[serde(default)]
    pub readers: i32,
    pub time: DateTime<Utc>,
    #[serde(rename = "buff", default)]
    pub buffer: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl DetectorStatus {
    pub fn is_idle(&self) -> bool {
        self.status == IDLE_STATUS
    }

    /// Whole seconds elapsed between the observation and `now`.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp() - self.time.timestamp()
    }
}

/// Per-host readout status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostStatus {
    pub host: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub status: i32,
    #[serde(default)]
    pub rate: f64,
    #[serde(default)]
    pub buffer_length: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Log entries
// ────────────────────────────────────────────────────────────────────────────

/// Log priority.  Ordering follows the integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug = 0,
    Message = 1,
    Warning = 2,
    Error = 3,
    Fatal = 4,
    /// Operator-initiated entries; not an operational fault signal.
    User = 5,
}

impl Severity {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Severity {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, i32> {
        match code {
            0 => Ok(Severity::Debug),
            1 => Ok(Severity::Message),
            2 => Ok(Severity::Warning),
            3 => Ok(Severity::Error),
            4 => Ok(Severity::Fatal),
            5 => Ok(Severity::User),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub priority: i32,
    pub time: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Failures of the backing document store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No {collection} document found for {key}")]
    NotFound {
        collection: &'static str,
        key: String,
    },

    #[error("{detector} control document is no longer at version {expected}")]
    VersionConflict { detector: String, expected: u64 },

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("corrupt {collection} document: {details}")]
    Corrupt {
        collection: &'static str,
        details: String,
    },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Why the latest detector status cannot be used.
#[derive(Error, Debug)]
pub enum StatusError {
    #[error("No status doc found at all for detector {0}")]
    NoStatus(String),

    /// The record is carried for diagnostics only.
    #[error("Status doc found, but it's {age_secs} seconds old")]
    Stale {
        record: Box<DetectorStatus>,
        age_secs: i64,
    },

    #[error("query returned no documents for host {0}")]
    NoHostStatus(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error taxonomy surfaced to API callers.
#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Access denied")]
    AuthDenied,

    #[error("Malformed request error: {0}")]
    MalformedRequest(String),

    #[error("Sorry, we don't support detector {0} yet!")]
    UnsupportedDetector(String),

    #[error("{reason}")]
    ControlDocUnavailable { detector: String, reason: String },

    #[error("Detector {0} must be in remote control mode to control via API")]
    NotInRemoteMode(String),

    #[error("Detector {detector} cannot be commanded via API: {reason}")]
    UnsafeToTransition { detector: String, reason: String },

    #[error("{0}")]
    StatusUnavailable(StatusError),

    #[error("Detector {detector} must be IDLE (0) but it is {code}")]
    NotIdle { detector: String, code: i32 },

    #[error("There is no options doc by the name {0}")]
    UnknownMode(String),

    #[error(
        "Control document for {detector} changed since it was read (expected version {expected})"
    )]
    Conflict { detector: String, expected: u64 },

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DaqError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DaqError::AuthDenied => "auth_denied",
            DaqError::MalformedRequest(_) => "malformed_request",
            DaqError::UnsupportedDetector(_) => "unsupported_detector",
            DaqError::ControlDocUnavailable { .. } => "control_doc_unavailable",
            DaqError::NotInRemoteMode(_) => "not_in_remote_mode",
            DaqError::UnsafeToTransition { .. } => "unsafe_to_transition",
            DaqError::StatusUnavailable(_) => "status_unavailable",
            DaqError::NotIdle { .. } => "not_idle",
            DaqError::UnknownMode(_) => "unknown_mode",
            DaqError::Conflict { .. } => "conflict",
            DaqError::Store(_) => "store_error",
        }
    }
}

impl From<StoreError> for DaqError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { detector, expected } => {
                DaqError::Conflict { detector, expected }
            }
            other => DaqError::Store(other),
        }
    }
}

impl From<StatusError> for DaqError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::Store(e) => DaqError::Store(e),
            other => DaqError::StatusUnavailable(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn flag_decodes_only_literal_strings() {
        assert_eq!(Flag::from_stored(Some("true")), Flag::True);
        assert_eq!(Flag::from_stored(Some("false")), Flag::False);
        assert_eq!(Flag::from_stored(Some("False")), Flag::Unknown);
        assert_eq!(Flag::from_stored(Some("")), Flag::Unknown);
        assert_eq!(Flag::from_stored(None), Flag::Unknown);
    }

    #[test]
    fn unknown_flag_is_neither_true_nor_false() {
        assert!(!Flag::Unknown.is_true());
        assert!(!Flag::Unknown.is_false());
    }

    #[test]
    fn control_document_serializes_with_wire_names() {
        let mut doc = ControlDocument::new("tpc");
        doc.remote_control_enabled = Flag::True;
        doc.mode = Some("background".into());
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["detector"], "tpc");
        assert_eq!(json["active"], "false");
        assert_eq!(json["remote"], "true");
        assert_eq!(json["link_mv"], "false");
        assert_eq!(json["link_nv"], "false");
        assert_eq!(json["mode"], "background");
        assert!(json.get("comment").is_none());
    }

    #[test]
    fn unknown_flags_are_omitted_and_read_back_as_unknown() {
        let mut doc = ControlDocument::new("tpc");
        doc.linked_to_nv = Flag::Unknown;
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("link_nv"));
        let back: ControlDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back.linked_to_nv, Flag::Unknown);
    }

    #[test]
    fn deactivate_touches_only_active_and_user() {
        let mut doc = ControlDocument::new("tpc");
        doc.active = Flag::True;
        doc.linked_to_mv = Flag::True;
        doc.mode = Some("led_calibration".into());
        doc.comment = Some("overnight".into());
        doc.version = 4;

        let next = ControlUpdate::Deactivate {
            user: "shifter".into(),
        }
        .apply_to(&doc);

        assert_eq!(next.active, Flag::False);
        assert_eq!(next.user.as_deref(), Some("shifter"));
        assert_eq!(next.linked_to_mv, Flag::True);
        assert_eq!(next.mode.as_deref(), Some("led_calibration"));
        assert_eq!(next.comment.as_deref(), Some("overnight"));
        assert_eq!(next.version, 5);
    }

    #[test]
    fn activate_clears_links_and_sets_run_fields() {
        let mut doc = ControlDocument::new("tpc");
        doc.linked_to_nv = Flag::True;
        doc.comment = Some("old".into());

        let next = ControlUpdate::Activate {
            mode: "background".into(),
            stop_after: Some("60".into()),
            comment: None,
            user: "shifter".into(),
        }
        .apply_to(&doc);

        assert_eq!(next.active, Flag::True);
        assert_eq!(next.mode.as_deref(), Some("background"));
        assert_eq!(next.stop_after.as_deref(), Some("60"));
        assert_eq!(next.comment, None);
        assert!(next.is_unlinked());
    }

    #[test]
    fn detector_status_age_uses_whole_seconds() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 31).unwrap();
        let status = DetectorStatus {
            detector: "tpc".into(),
            status: 0,
            number: 0,
            rate: 0.0,
            readers: 0,
            time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            buffer: 0.0,
            mode: None,
        };
        assert_eq!(status.age_secs(now), 31);
        assert!(status.is_idle());
    }

    #[test]
    fn severity_orders_by_code() {
        assert!(Severity::Warning < Severity::Error);
        assert_eq!(Severity::try_from(4), Ok(Severity::Fatal));
        assert_eq!(Severity::try_from(9), Err(9));
        assert_eq!(Severity::User.code(), 5);
    }

    #[test]
    fn every_code_decodes_to_its_severity() {
        for code in 0..=5 {
            assert_eq!(Severity::try_from(code).map(Severity::code), Ok(code));
        }
        assert_eq!(Severity::try_from(3), Ok(Severity::Error));
        assert_eq!(Severity::try_from(-1), Err(-1));
    }

    #[test]
    fn version_conflict_maps_to_conflict() {
        let err: DaqError = StoreError::VersionConflict {
            detector: "tpc".into(),
            expected: 3,
        }
        .into();
        assert!(matches!(err, DaqError::Conflict { expected: 3, .. }));
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn status_store_failure_is_not_reported_as_unavailable() {
        let err: DaqError = StatusError::Store(StoreError::Backend("down".into())).into();
        assert!(matches!(err, DaqError::Store(_)));

        let err: DaqError = StatusError::NoStatus("tpc".into()).into();
        assert!(matches!(err, DaqError::StatusUnavailable(_)));
        assert!(err.to_string().contains("tpc"));
    }

    #[test]
    fn not_idle_message_names_the_code() {
        let err = DaqError::NotIdle {
            detector: "tpc".into(),
            code: 3,
        };
        assert_eq!(err.to_string(), "Detector tpc must be IDLE (0) but it is 3");
    }
}
