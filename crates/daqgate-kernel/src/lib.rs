//! `daqgate-kernel` – Command Admission & Status Freshness
//!
//! The kernel decides; it never performs I/O of its own.  Every document it
//! needs is fetched through the seams in [`daqgate_types::repository`], so a
//! decision is always taken against freshly read state and nothing is kept
//! in memory between requests.
//!
//! # Modules
//!
//! - [`admission`] – [`CommandAdmission`][admission::CommandAdmission]: the
//!   ordered gate sequence that admits or rejects a detector transition and
//!   issues the single conditional control-document write.
//! - [`freshness`] – [`StatusAccessor`][freshness::StatusAccessor] and
//!   [`StalenessBound`][freshness::StalenessBound]: reads the latest status
//!   and refuses records that are too old to be trusted.
//! - [`options`] – [`OptionsValidator`][options::OptionsValidator]: checks a
//!   requested mode against the options catalog.
//! - [`log_filter`] – [`LogSeverityFilter`][log_filter::LogSeverityFilter]:
//!   recent log entries at or above a severity, excluding user entries.
//! - [`credentials`] – [`Authenticator`][credentials::Authenticator]: bcrypt
//!   API-key hashing and verification.

pub mod admission;
pub mod credentials;
pub mod freshness;
pub mod log_filter;
pub mod options;

pub use admission::{AdmissionPolicy, CommandAdmission, DEFAULT_CONTROLLABLE_DETECTOR};
pub use credentials::{Authenticator, DEFAULT_KEY_COST, hash_api_key, verify_api_key};
pub use freshness::{HostStatusReadout, StalenessBound, StatusAccessor};
pub use log_filter::LogSeverityFilter;
pub use options::OptionsValidator;

#[cfg(test)]
pub(crate) mod testing;
