//! [`ApiError`] – HTTP rendering of [`DaqError`].
//!
//! Every failure is answered with a JSON body
//! `{"message": <operator-readable text>, "error": <stable kind>}` and a
//! status code that is distinct per error kind:
//!
//! | kind                      | status |
//! |---------------------------|--------|
//! | `auth_denied`             | 401    |
//! | `malformed_request`       | 400    |
//! | `unsupported_detector`    | 501    |
//! | `control_doc_unavailable` | 404    |
//! | `not_in_remote_mode`      | 403    |
//! | `unsafe_to_transition`    | 409    |
//! | `status_unavailable`      | 503    |
//! | `not_idle`                | 423    |
//! | `unknown_mode`            | 422    |
//! | `conflict`                | 412    |
//! | `store_error` (timeout)   | 504    |
//! | `store_error`             | 500    |

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use daqgate_types::{DaqError, StoreError};
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug)]
pub struct ApiError(pub DaqError);

impl From<DaqError> for ApiError {
    fn from(err: DaqError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    error: &'static str,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DaqError::AuthDenied => StatusCode::UNAUTHORIZED,
            DaqError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            DaqError::UnsupportedDetector(_) => StatusCode::NOT_IMPLEMENTED,
            DaqError::ControlDocUnavailable { .. } => StatusCode::NOT_FOUND,
            DaqError::NotInRemoteMode(_) => StatusCode::FORBIDDEN,
            DaqError::UnsafeToTransition { .. } => StatusCode::CONFLICT,
            DaqError::StatusUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DaqError::NotIdle { .. } => StatusCode::LOCKED,
            DaqError::UnknownMode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DaqError::Conflict { .. } => StatusCode::PRECONDITION_FAILED,
            DaqError::Store(StoreError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            DaqError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, kind = self.0.kind(), %status, "request failed");
        } else {
            warn!(error = %self.0, kind = self.0.kind(), %status, "request refused");
        }
        let body = ErrorBody {
            message: self.0.to_string(),
            error: self.0.kind(),
        };
        (status, Json(body)).into_response()
    }
}
