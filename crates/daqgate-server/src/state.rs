//! [`AppState`] – everything a handler needs, built once per process.

use std::sync::Arc;
use std::time::Duration;

use daqgate_kernel::{
    AdmissionPolicy, Authenticator, CommandAdmission, LogSeverityFilter, OptionsValidator,
    StalenessBound, StatusAccessor,
};
use daqgate_kernel::log_filter::{DEFAULT_MIN_SEVERITY, DEFAULT_PAGE_SIZE};
use daqgate_types::repository::{
    ControlRepository, CredentialSource, LogSource, OptionsCatalog, StatusSource,
};
use daqgate_types::{DaqError, Severity, StoreError};

/// Freshness bound for `/detector_status`.  Independent of the admission
/// policy's bound.
pub const DEFAULT_STATUS_STALENESS_SECS: i64 = 30;

/// Store lock wait applied to every handler call by default.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables of the HTTP layer.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub policy: AdmissionPolicy,
    pub store_timeout: Duration,
    pub status_staleness: StalenessBound,
    pub log_page_size: usize,
    pub default_log_level: Severity,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            policy: AdmissionPolicy::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            status_staleness: StalenessBound::from_secs(DEFAULT_STATUS_STALENESS_SECS),
            log_page_size: DEFAULT_PAGE_SIZE,
            default_log_level: DEFAULT_MIN_SEVERITY,
        }
    }
}

/// Application state shared across handlers.
pub struct AppState {
    pub admission: CommandAdmission,
    pub status: StatusAccessor,
    pub logs: LogSeverityFilter,
    pub authenticator: Authenticator,
    pub store_timeout: Duration,
    pub status_staleness: StalenessBound,
    pub default_log_level: Severity,
}

impl AppState {
    /// Wire every component to the one injected `store` handle.
    pub fn from_store<S>(store: Arc<S>, settings: ServerSettings) -> Self
    where
        S: ControlRepository
            + StatusSource
            + OptionsCatalog
            + LogSource
            + CredentialSource
            + 'static,
    {
        let status = StatusAccessor::new(store.clone());
        let options = OptionsValidator::new(store.clone());
        let admission =
            CommandAdmission::new(settings.policy, store.clone(), status.clone(), options);
        Self {
            admission,
            status,
            logs: LogSeverityFilter::new(store.clone()).with_page_size(settings.log_page_size),
            authenticator: Authenticator::new(store),
            store_timeout: settings.store_timeout,
            status_staleness: settings.status_staleness,
            default_log_level: settings.default_log_level,
        }
    }

    /// Run a synchronous, read-only store call on the blocking pool, giving
    /// up after the configured store timeout.  There is no retry.
    ///
    /// Giving up does not cancel the call, so writes go through
    /// [`blocking_to_completion`](Self::blocking_to_completion) instead.
    pub async fn blocking<T, F>(&self, call: F) -> Result<T, DaqError>
    where
        F: FnOnce() -> Result<T, DaqError> + Send + 'static,
        T: Send + 'static,
    {
        let timeout = self.store_timeout;
        match tokio::time::timeout(timeout, tokio::task::spawn_blocking(call)).await {
            Ok(joined) => flatten(joined),
            Err(_) => Err(DaqError::Store(StoreError::Timeout(timeout))),
        }
    }

    /// Run a store call on the blocking pool and wait for its own outcome.
    ///
    /// The call must bound itself: the store's busy timeout limits each
    /// statement and the admission budget limits when a write may start.
    /// The reported result is always the one the store produced.
    pub async fn blocking_to_completion<T, F>(&self, call: F) -> Result<T, DaqError>
    where
        F: FnOnce() -> Result<T, DaqError> + Send + 'static,
        T: Send + 'static,
    {
        flatten(tokio::task::spawn_blocking(call).await)
    }
}

fn flatten<T>(joined: Result<Result<T, DaqError>, tokio::task::JoinError>) -> Result<T, DaqError> {
    joined.unwrap_or_else(|join| {
        Err(DaqError::Store(StoreError::Backend(format!(
            "store task failed: {join}"
        ))))
    })
}
