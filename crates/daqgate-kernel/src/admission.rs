//! [`CommandAdmission`] – the single gate every detector transition passes.
//!
//! [`CommandAdmission::request_transition`] evaluates the following checks
//! **in order**.  The first one that fails decides the reported error and no
//! document is written.
//!
//! 1. **Detector support** – only the policy's controllable detector may be
//!    commanded here ([`DaqError::UnsupportedDetector`]).
//! 2. **Control document** – the current document must be readable
//!    ([`DaqError::ControlDocUnavailable`]).
//! 3. **Remote mode** – `remote` must be `"true"`
//!    ([`DaqError::NotInRemoteMode`]).
//! 4. **Direction and links** – activation requires the detector to be
//!    inactive and unlinked from both vetoes; deactivation requires it to be
//!    active and, unless the policy says otherwise, ignores links
//!    ([`DaqError::UnsafeToTransition`]).
//! 5. **Hardware state** (activation only) – the latest aggregate status must
//!    be fresh ([`DaqError::StatusUnavailable`]) and IDLE
//!    ([`DaqError::NotIdle`]).
//! 6. **Mode** (activation only) – the requested mode must exist in the
//!    options catalog ([`DaqError::UnknownMode`]).
//!
//! When every applicable gate passes, exactly one conditional write is
//! issued against the version read in step 2.  If another writer got there
//! first the store refuses it and [`DaqError::Conflict`] is returned.
//! [`CommandAdmission::request_transition_within`] additionally refuses to
//! start the write once its time budget is spent, so a caller that gives up
//! waiting never leaves a late write behind.
//!
//! # Example
//!
//! ```ignore
//! let engine = CommandAdmission::new(AdmissionPolicy::default(), controls, status, options);
//! let request = TransitionRequest {
//!     detector: "tpc".into(),
//!     intent: TransitionIntent::Deactivate,
//!     user: "shifter".into(),
//! };
//! engine.request_transition(&request, Utc::now())?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use daqgate_types::repository::ControlRepository;
use daqgate_types::{
    ControlDocument, ControlUpdate, DaqError, StoreError, TransitionIntent, TransitionRequest,
};
use tracing::{info, instrument, warn};

use crate::freshness::{StalenessBound, StatusAccessor};
use crate::options::OptionsValidator;

/// The only detector that may be commanded through the API by default.
pub const DEFAULT_CONTROLLABLE_DETECTOR: &str = "tpc";

/// Staleness bound applied to the hardware-state gate by default.
pub const DEFAULT_COMMAND_STALENESS_SECS: i64 = 30;

// ────────────────────────────────────────────────────────────────────────────
// Policy
// ────────────────────────────────────────────────────────────────────────────

/// Deployment-specific knobs of the admission sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Detector that may be commanded.  Every other name is unsupported.
    pub controllable_detector: String,
    /// Bound applied to the status record consulted before activation.
    pub staleness: StalenessBound,
    /// When `true`, deactivation is also refused while the detector is
    /// linked to either veto.  Defaults to `false`: stopping is the safe
    /// direction.
    pub deactivation_requires_unlinked: bool,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            controllable_detector: DEFAULT_CONTROLLABLE_DETECTOR.to_string(),
            staleness: StalenessBound::from_secs(DEFAULT_COMMAND_STALENESS_SECS),
            deactivation_requires_unlinked: false,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

/// Stateless admission engine.  Every call re-reads the documents it needs.
#[derive(Clone)]
pub struct CommandAdmission {
    policy: AdmissionPolicy,
    controls: Arc<dyn ControlRepository>,
    status: StatusAccessor,
    options: OptionsValidator,
}

impl CommandAdmission {
    pub fn new(
        policy: AdmissionPolicy,
        controls: Arc<dyn ControlRepository>,
        status: StatusAccessor,
        options: OptionsValidator,
    ) -> Self {
        Self {
            policy,
            controls,
            status,
            options,
        }
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// Current control document for `detector`.  Reads never write.
    ///
    /// A timed-out read stays a store error so callers can tell a slow
    /// store from a missing document.
    pub fn current(&self, detector: &str) -> Result<ControlDocument, DaqError> {
        self.controls
            .control_document(detector)
            .map_err(|e| match e {
                StoreError::Timeout(_) => DaqError::Store(e),
                other => DaqError::ControlDocUnavailable {
                    detector: detector.to_string(),
                    reason: other.to_string(),
                },
            })
    }

    /// Admit or reject `request`, evaluated at wall-clock time `now`.
    ///
    /// On success the store has acknowledged the write and the returned
    /// document is the one the update produced.  Hardware follow-through is
    /// not awaited.
    pub fn request_transition(
        &self,
        request: &TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<ControlDocument, DaqError> {
        self.admit(request, now, None)
    }

    /// Like [`request_transition`](Self::request_transition), but the write
    /// is only issued while less than `budget` has elapsed since the call
    /// began.  Past that point the request fails with
    /// [`StoreError::Timeout`] and the document is left untouched.
    pub fn request_transition_within(
        &self,
        request: &TransitionRequest,
        now: DateTime<Utc>,
        budget: Duration,
    ) -> Result<ControlDocument, DaqError> {
        self.admit(request, now, Some((Instant::now(), budget)))
    }

    #[instrument(skip(self, request, now, deadline), fields(detector = %request.detector, user = %request.user))]
    fn admit(
        &self,
        request: &TransitionRequest,
        now: DateTime<Utc>,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<ControlDocument, DaqError> {
        match self.evaluate(request, now, deadline) {
            Ok(doc) => {
                info!(active = %doc.active, mode = ?doc.mode, version = doc.version, "transition admitted");
                Ok(doc)
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "transition rejected");
                Err(e)
            }
        }
    }

    fn evaluate(
        &self,
        request: &TransitionRequest,
        now: DateTime<Utc>,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<ControlDocument, DaqError> {
        let detector = request.detector.as_str();

        if detector != self.policy.controllable_detector {
            return Err(DaqError::UnsupportedDetector(detector.to_string()));
        }

        let current = self.current(detector)?;

        if !current.remote_control_enabled.is_true() {
            return Err(DaqError::NotInRemoteMode(detector.to_string()));
        }

        self.check_direction_and_links(&current, &request.intent)?;

        let update = match &request.intent {
            TransitionIntent::Deactivate => ControlUpdate::Deactivate {
                user: request.user.clone(),
            },
            TransitionIntent::Activate {
                mode,
                stop_after,
                comment,
            } => {
                let status = self
                    .status
                    .latest_detector_status(detector, self.policy.staleness, now)?;
                if !status.is_idle() {
                    return Err(DaqError::NotIdle {
                        detector: detector.to_string(),
                        code: status.status,
                    });
                }
                if !self.options.exists(mode)? {
                    return Err(DaqError::UnknownMode(mode.clone()));
                }
                ControlUpdate::Activate {
                    mode: mode.clone(),
                    stop_after: stop_after.clone(),
                    comment: comment.clone(),
                    user: request.user.clone(),
                }
            }
        };

        if let Some((started, budget)) = deadline {
            if started.elapsed() >= budget {
                return Err(DaqError::Store(StoreError::Timeout(budget)));
            }
        }

        self.controls
            .apply_update(detector, current.version, &update)?;
        Ok(update.apply_to(&current))
    }

    fn check_direction_and_links(
        &self,
        current: &ControlDocument,
        intent: &TransitionIntent,
    ) -> Result<(), DaqError> {
        let unsafe_because = |reason: String| DaqError::UnsafeToTransition {
            detector: current.detector.clone(),
            reason,
        };

        let links_checked = match intent {
            TransitionIntent::Activate { .. } => {
                if !current.active.is_false() {
                    return Err(unsafe_because(format!(
                        "it must be inactive to activate (active={})",
                        current.active
                    )));
                }
                true
            }
            TransitionIntent::Deactivate => {
                if !current.active.is_true() {
                    return Err(unsafe_because(format!(
                        "it must be active to deactivate (active={})",
                        current.active
                    )));
                }
                self.policy.deactivation_requires_unlinked
            }
        };

        if links_checked && !current.is_unlinked() {
            return Err(unsafe_because(format!(
                "it must be unlinked from other detectors (link_mv={}, link_nv={})",
                current.linked_to_mv, current.linked_to_nv
            )));
        }
        Ok(())
    }
}
