//! Service configuration – reads `~/.daqgate/config.toml` or `--config`.
//!
//! Every field has a default, so an empty or missing file is a valid
//! configuration.  `DAQGATE_*` environment variables override the file.
//! No secrets live here: API keys are stored only as bcrypt hashes in the
//! database.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use daqgate_kernel::credentials::KEY_COST_RANGE;
use daqgate_kernel::{AdmissionPolicy, StalenessBound};
use daqgate_server::ServerSettings;
use daqgate_types::Severity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("config file {0} does not exist")]
    Missing(PathBuf),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the command API binds to.
    pub listen_addr: SocketAddr,

    /// SQLite database file.
    pub database_path: PathBuf,

    /// Longest wait for any single store call, in seconds.
    pub store_timeout_secs: u64,

    /// Staleness bound for the status consulted before activation.
    /// Zero or less disables the check.
    pub command_staleness_secs: i64,

    /// Staleness bound for `/detector_status`.
    pub status_staleness_secs: i64,

    /// The one detector that may be commanded.
    pub controllable_detector: String,

    /// Refuse deactivation while the detector is linked to a veto.
    pub deactivation_requires_unlinked: bool,

    /// Entries returned by `/geterrors`.
    pub log_page_size: usize,

    /// Minimum severity `/geterrors` uses when no `level` is given.
    pub default_log_level: i32,

    /// bcrypt work factor for keys registered with `add-user`.
    pub api_key_cost: u32,

    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], daqgate_server::DEFAULT_PORT)),
            database_path: PathBuf::from("daqgate.sqlite"),
            store_timeout_secs: 30,
            command_staleness_secs: daqgate_kernel::admission::DEFAULT_COMMAND_STALENESS_SECS,
            status_staleness_secs: daqgate_server::state::DEFAULT_STATUS_STALENESS_SECS,
            controllable_detector: daqgate_kernel::DEFAULT_CONTROLLABLE_DETECTOR.to_string(),
            deactivation_requires_unlinked: false,
            log_page_size: daqgate_kernel::log_filter::DEFAULT_PAGE_SIZE,
            default_log_level: daqgate_kernel::log_filter::DEFAULT_MIN_SEVERITY.code(),
            api_key_cost: daqgate_kernel::DEFAULT_KEY_COST,
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// Reject values that parse but make no sense.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "store_timeout_secs must be at least 1".into(),
            ));
        }
        if self.log_page_size == 0 {
            return Err(ConfigError::Invalid("log_page_size must be at least 1".into()));
        }
        if self.controllable_detector.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "controllable_detector must not be empty".into(),
            ));
        }
        if !KEY_COST_RANGE.contains(&self.api_key_cost) {
            return Err(ConfigError::Invalid(format!(
                "api_key_cost must be {}..={}, got {}",
                KEY_COST_RANGE.start(),
                KEY_COST_RANGE.end(),
                self.api_key_cost
            )));
        }
        self.default_severity().map(|_| ())
    }

    fn default_severity(&self) -> Result<Severity, ConfigError> {
        Severity::try_from(self.default_log_level).map_err(|code| {
            ConfigError::Invalid(format!("default_log_level must be 0..=5, got {code}"))
        })
    }

    /// Settings for the HTTP layer derived from this configuration.
    pub fn server_settings(&self) -> Result<ServerSettings, ConfigError> {
        self.validate()?;
        Ok(ServerSettings {
            policy: AdmissionPolicy {
                controllable_detector: self.controllable_detector.clone(),
                staleness: StalenessBound::from_secs(self.command_staleness_secs),
                deactivation_requires_unlinked: self.deactivation_requires_unlinked,
            },
            store_timeout: self.store_timeout(),
            status_staleness: StalenessBound::from_secs(self.status_staleness_secs),
            log_page_size: self.log_page_size,
            default_log_level: self.default_severity()?,
        })
    }
}

/// Return the path to `~/.daqgate/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".daqgate").join("config.toml")
}

/// Resolve the effective configuration.
///
/// An explicit `path` must exist.  Without one the default path is tried and
/// built-in defaults are used when it is absent.  Environment overrides are
/// applied last and the result is validated.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut cfg = match path {
        Some(p) => load_from(p)?.ok_or_else(|| ConfigError::Missing(p.to_path_buf()))?,
        None => load_from(&config_path())?.unwrap_or_default(),
    };
    apply_env_overrides(&mut cfg)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(cfg))
}

/// Apply `DAQGATE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `DAQGATE_LISTEN_ADDR` | `listen_addr` |
/// | `DAQGATE_DATABASE_PATH` | `database_path` |
/// | `DAQGATE_STORE_TIMEOUT_SECS` | `store_timeout_secs` |
/// | `DAQGATE_COMMAND_STALENESS_SECS` | `command_staleness_secs` |
/// | `DAQGATE_STATUS_STALENESS_SECS` | `status_staleness_secs` |
/// | `DAQGATE_CONTROLLABLE_DETECTOR` | `controllable_detector` |
/// | `DAQGATE_DEACTIVATION_REQUIRES_UNLINKED` | `deactivation_requires_unlinked` |
/// | `DAQGATE_LOG_PAGE_SIZE` | `log_page_size` |
/// | `DAQGATE_DEFAULT_LOG_LEVEL` | `default_log_level` |
/// | `DAQGATE_API_KEY_COST` | `api_key_cost` |
/// | `DAQGATE_LOG_FORMAT` | `log_format` |
pub fn apply_env_overrides(cfg: &mut Config) -> Result<(), ConfigError> {
    apply_overrides(cfg, |name| std::env::var(name).ok())
}

/// Same as [`apply_env_overrides`] with an injectable variable lookup.
///
/// A variable that is set but does not parse is an error rather than being
/// silently ignored.
pub(crate) fn apply_overrides(
    cfg: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    fn parsed<T: FromStr>(
        lookup: &impl Fn(&str) -> Option<String>,
        name: &str,
    ) -> Result<Option<T>, ConfigError>
    where
        T::Err: fmt::Display,
    {
        match lookup(name) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::Invalid(format!("{name}={raw:?}: {e}"))),
        }
    }

    if let Some(v) = parsed(&lookup, "DAQGATE_LISTEN_ADDR")? {
        cfg.listen_addr = v;
    }
    if let Some(v) = lookup("DAQGATE_DATABASE_PATH") {
        cfg.database_path = PathBuf::from(v);
    }
    if let Some(v) = parsed(&lookup, "DAQGATE_STORE_TIMEOUT_SECS")? {
        cfg.store_timeout_secs = v;
    }
    if let Some(v) = parsed(&lookup, "DAQGATE_COMMAND_STALENESS_SECS")? {
        cfg.command_staleness_secs = v;
    }
    if let Some(v) = parsed(&lookup, "DAQGATE_STATUS_STALENESS_SECS")? {
        cfg.status_staleness_secs = v;
    }
    if let Some(v) = lookup("DAQGATE_CONTROLLABLE_DETECTOR") {
        cfg.controllable_detector = v;
    }
    if let Some(v) = parsed(&lookup, "DAQGATE_DEACTIVATION_REQUIRES_UNLINKED")? {
        cfg.deactivation_requires_unlinked = v;
    }
    if let Some(v) = parsed(&lookup, "DAQGATE_LOG_PAGE_SIZE")? {
        cfg.log_page_size = v;
    }
    if let Some(v) = parsed(&lookup, "DAQGATE_DEFAULT_LOG_LEVEL")? {
        cfg.default_log_level = v;
    }
    if let Some(v) = parsed(&lookup, "DAQGATE_API_KEY_COST")? {
        cfg.api_key_cost = v;
    }
    if let Some(v) = parsed(&lookup, "DAQGATE_LOG_FORMAT")? {
        cfg.log_format = v;
    }
    Ok(())
}
