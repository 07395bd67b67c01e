//! `detector_control` – per-detector commanded intent.
//!
//! Updates are field-level: each [`ControlUpdate`] variant names the columns
//! it sets and leaves the rest alone.  Every update is conditional on the
//! `version` column still holding the value the caller read, and bumps it in
//! the same statement, so two racing writers cannot both succeed.

use chrono::Utc;
use daqgate_types::repository::ControlRepository;
use daqgate_types::{ControlDocument, ControlUpdate, Flag, StoreError};
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use crate::DaqStore;

const COLLECTION: &str = "detector_control";

impl DaqStore {
    /// Insert the control document for a new detector.
    ///
    /// Returns `false` (and changes nothing) when the detector already has
    /// one.
    pub fn create_control_document(&self, doc: &ControlDocument) -> Result<bool, StoreError> {
        let now = crate::encode_time(&Utc::now());
        let inserted = self.with_conn(COLLECTION, |conn| {
            conn.execute(
                "INSERT INTO detector_control
                    (detector, mode, active, remote, link_mv, link_nv,
                     stop_after, comment, \"user\", version, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)
                 ON CONFLICT (detector) DO NOTHING",
                params![
                    doc.detector,
                    doc.mode,
                    doc.active.as_stored(),
                    doc.remote_control_enabled.as_stored(),
                    doc.linked_to_mv.as_stored(),
                    doc.linked_to_nv.as_stored(),
                    doc.stop_after,
                    doc.comment,
                    doc.user,
                    now,
                ],
            )
        })?;
        Ok(inserted == 1)
    }
}

impl ControlRepository for DaqStore {
    fn control_document(&self, detector: &str) -> Result<ControlDocument, StoreError> {
        self.with_conn(COLLECTION, |conn| {
            conn.query_row(
                "SELECT detector, mode, active, remote, link_mv, link_nv,
                        stop_after, comment, \"user\", version
                 FROM detector_control WHERE detector = ?1",
                params![detector],
                row_to_document,
            )
            .optional()
        })?
        .ok_or_else(|| StoreError::NotFound {
            collection: "control",
            key: format!("detector {detector}"),
        })
    }

    fn apply_update(
        &self,
        detector: &str,
        expected_version: u64,
        update: &ControlUpdate,
    ) -> Result<(), StoreError> {
        let now = crate::encode_time(&Utc::now());
        let version = expected_version as i64;

        let (changed, exists) = self.with_conn(COLLECTION, |conn| {
            let changed = match update {
                ControlUpdate::Deactivate { user } => conn.execute(
                    "UPDATE detector_control
                     SET active = 'false', \"user\" = ?1,
                         version = version + 1, updated_at = ?2
                     WHERE detector = ?3 AND version = ?4",
                    params![user, now, detector, version],
                )?,
                ControlUpdate::Activate {
                    mode,
                    stop_after,
                    comment,
                    user,
                } => conn.execute(
                    "UPDATE detector_control
                     SET active = 'true', mode = ?1, stop_after = ?2, comment = ?3,
                         \"user\" = ?4, link_mv = 'false', link_nv = 'false',
                         version = version + 1, updated_at = ?5
                     WHERE detector = ?6 AND version = ?7",
                    params![mode, stop_after, comment, user, now, detector, version],
                )?,
            };
            if changed == 1 {
                return Ok((changed, true));
            }
            let exists = conn
                .query_row(
                    "SELECT 1 FROM detector_control WHERE detector = ?1",
                    params![detector],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            Ok((changed, exists))
        })?;

        match (changed, exists) {
            (1, _) => {
                debug!(detector, version = expected_version + 1, user = update.user(), "control document updated");
                Ok(())
            }
            (_, true) => Err(StoreError::VersionConflict {
                detector: detector.to_string(),
                expected: expected_version,
            }),
            (_, false) => Err(StoreError::NotFound {
                collection: "control",
                key: format!("detector {detector}"),
            }),
        }
    }
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<ControlDocument> {
    let flag = |idx: usize| -> rusqlite::Result<Flag> {
        let raw: Option<String> = row.get(idx)?;
        Ok(Flag::from_stored(raw.as_deref()))
    };
    let version: i64 = row.get(9)?;
    Ok(ControlDocument {
        detector: row.get(0)?,
        mode: row.get(1)?,
        active: flag(2)?,
        remote_control_enabled: flag(3)?,
        linked_to_mv: flag(4)?,
        linked_to_nv: flag(5)?,
        stop_after: row.get(6)?,
        comment: row.get(7)?,
        user: row.get(8)?,
        version: u64::try_from(version).map_err(|_| {
            rusqlite::Error::IntegralValueOutOfRange(9, version)
        })?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(doc: ControlDocument) -> DaqStore {
        let store = DaqStore::open_in_memory().unwrap();
        assert!(store.create_control_document(&doc).unwrap());
        store
    }

    fn remote_doc() -> ControlDocument {
        let mut doc = ControlDocument::new("tpc");
        doc.remote_control_enabled = Flag::True;
        doc.mode = Some("background".into());
        doc.comment = Some("weekend run".into());
        doc.stop_after = Some("120".into());
        doc.linked_to_mv = Flag::True;
        doc
    }

    #[test]
    fn created_document_reads_back() {
        let store = store_with(remote_doc());
        let doc = store.control_document("tpc").unwrap();
        assert_eq!(doc.detector, "tpc");
        assert_eq!(doc.remote_control_enabled, Flag::True);
        assert_eq!(doc.linked_to_mv, Flag::True);
        assert_eq!(doc.mode.as_deref(), Some("background"));
        assert_eq!(doc.version, 0);
    }

    #[test]
    fn create_does_not_overwrite() {
        let store = store_with(remote_doc());
        assert!(!store.create_control_document(&ControlDocument::new("tpc")).unwrap());
        assert_eq!(
            store.control_document("tpc").unwrap().remote_control_enabled,
            Flag::True
        );
    }

    #[test]
    fn missing_document_is_not_found() {
        let store = DaqStore::open_in_memory().unwrap();
        let err = store.control_document("tpc").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(err.to_string(), "No control document found for detector tpc");
    }

    #[test]
    fn null_flags_read_as_unknown() {
        let mut doc = remote_doc();
        doc.linked_to_nv = Flag::Unknown;
        let store = store_with(doc);
        assert_eq!(
            store.control_document("tpc").unwrap().linked_to_nv,
            Flag::Unknown
        );
    }

    #[test]
    fn deactivate_touches_only_active_and_user() {
        let mut doc = remote_doc();
        doc.active = Flag::True;
        let store = store_with(doc);

        store
            .apply_update("tpc", 0, &ControlUpdate::Deactivate { user: "shifter".into() })
            .unwrap();

        let doc = store.control_document("tpc").unwrap();
        assert_eq!(doc.active, Flag::False);
        assert_eq!(doc.user.as_deref(), Some("shifter"));
        assert_eq!(doc.mode.as_deref(), Some("background"));
        assert_eq!(doc.comment.as_deref(), Some("weekend run"));
        assert_eq!(doc.stop_after.as_deref(), Some("120"));
        assert_eq!(doc.linked_to_mv, Flag::True);
        assert_eq!(doc.version, 1);
    }

    #[test]
    fn activate_sets_run_fields_and_clears_links() {
        let store = store_with(remote_doc());
        let update = ControlUpdate::Activate {
            mode: "led_calibration".into(),
            stop_after: None,
            comment: Some("gain check".into()),
            user: "shifter".into(),
        };
        store.apply_update("tpc", 0, &update).unwrap();

        let doc = store.control_document("tpc").unwrap();
        assert_eq!(doc.active, Flag::True);
        assert_eq!(doc.mode.as_deref(), Some("led_calibration"));
        assert_eq!(doc.stop_after, None);
        assert_eq!(doc.comment.as_deref(), Some("gain check"));
        assert_eq!(doc.linked_to_mv, Flag::False);
        assert_eq!(doc.linked_to_nv, Flag::False);
        assert_eq!(doc.remote_control_enabled, Flag::True);

        // The store and the in-memory model agree on the result.
        assert_eq!(doc, update.apply_to(&remote_doc()));
    }

    #[test]
    fn stale_version_is_a_conflict() {
        let store = store_with(remote_doc());
        let update = ControlUpdate::Deactivate { user: "a".into() };
        store.apply_update("tpc", 0, &update).unwrap();

        let err = store.apply_update("tpc", 0, &update).unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 0, .. }));
        assert_eq!(store.control_document("tpc").unwrap().version, 1);
    }

    #[test]
    fn update_of_missing_document_is_not_found() {
        let store = DaqStore::open_in_memory().unwrap();
        let err = store
            .apply_update("tpc", 0, &ControlUpdate::Deactivate { user: "a".into() })
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn repeated_reads_are_identical() {
        let store = store_with(remote_doc());
        assert_eq!(
            store.control_document("tpc").unwrap(),
            store.control_document("tpc").unwrap()
        );
    }
}
