//! Typed request bodies and query strings.
//!
//! Nothing reaches the admission engine until it has been parsed into a
//! [`TransitionRequest`]; unknown fields, a missing or non-literal `active`,
//! and an activation without a mode are all [`DaqError::MalformedRequest`].

use daqgate_types::{DaqError, Severity, TransitionIntent, TransitionRequest};
use serde::Deserialize;

/// Form body of `POST /setcommand/{detector}`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetCommandForm {
    pub active: Option<String>,
    pub mode: Option<String>,
    pub comment: Option<String>,
    pub stop_after: Option<String>,
    // Credentials may ride in the body; the auth layer has already used them.
    pub api_user: Option<String>,
    pub api_key: Option<String>,
}

impl SetCommandForm {
    /// Validate the form into a request issued by `user`.
    ///
    /// For deactivation `mode`, `comment` and `stop_after` are accepted and
    /// ignored.
    pub fn into_request(self, detector: String, user: String) -> Result<TransitionRequest, DaqError> {
        let intent = match self.active.as_deref().map(str::trim) {
            Some("true") => {
                let mode = non_empty(self.mode).ok_or_else(|| {
                    DaqError::MalformedRequest("activation requires a non-empty mode".into())
                })?;
                TransitionIntent::Activate {
                    mode,
                    stop_after: non_empty(self.stop_after),
                    comment: non_empty(self.comment),
                }
            }
            Some("false") => TransitionIntent::Deactivate,
            Some(other) => {
                return Err(DaqError::MalformedRequest(format!(
                    "active must be \"true\" or \"false\", got {other:?}"
                )));
            }
            None => return Err(DaqError::MalformedRequest("missing field active".into())),
        };
        Ok(TransitionRequest {
            detector,
            intent,
            user,
        })
    }
}

fn non_empty(field: Option<String>) -> Option<String> {
    field
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `?time_seconds=N` on `/getstatus/{host}`.
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub time_seconds: Option<i64>,
}

impl StatusQuery {
    /// Window length in seconds; zero selects the latest record only.
    pub fn window_secs(&self) -> Result<i64, DaqError> {
        match self.time_seconds {
            None => Ok(0),
            Some(n) if n >= 0 => Ok(n),
            Some(n) => Err(DaqError::MalformedRequest(format!(
                "time_seconds must not be negative, got {n}"
            ))),
        }
    }
}

/// `?level=N` on `/geterrors`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorsQuery {
    pub level: Option<i32>,
}

impl ErrorsQuery {
    pub fn severity(&self, default: Severity) -> Result<Severity, DaqError> {
        match self.level {
            None => Ok(default),
            Some(code) => Severity::try_from(code).map_err(|code| {
                DaqError::MalformedRequest(format!("level must be between 0 and 5, got {code}"))
            }),
        }
    }
}
