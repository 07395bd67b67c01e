//! API-key authentication middleware.
//!
//! Credentials are read from the urlencoded form body first, then from the
//! query string.  The body is buffered and put back so downstream extractors
//! still see it.  On success the authenticated username is attached to the
//! request as an [`Operator`] extension.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use daqgate_types::DaqError;
use serde::Deserialize;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::ApiError;
use crate::state::AppState;

/// Largest form body accepted: 64 KiB.
pub const MAX_FORM_BYTES: usize = 64 * 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Identity of the authenticated API user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator(pub String);

#[derive(Default, Deserialize)]
struct Credentials {
    api_user: Option<String>,
    api_key: Option<String>,
}

impl Credentials {
    fn parse(encoded: &str) -> Self {
        serde_urlencoded::from_str(encoded).unwrap_or_default()
    }

    fn or(self, fallback: Credentials) -> Self {
        Self {
            api_user: self.api_user.or(fallback.api_user),
            api_key: self.api_key.or(fallback.api_key),
        }
    }
}

pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, request).await {
        Ok(request) => next.run(request).await,
        Err(e) => ApiError(e).into_response(),
    }
}

async fn authenticate(state: &AppState, request: Request) -> Result<Request, DaqError> {
    let from_query = Credentials::parse(request.uri().query().unwrap_or_default());

    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE));

    let (mut request, credentials) = if is_form {
        let (parts, body) = request.into_parts();
        let bytes = to_bytes(body, MAX_FORM_BYTES)
            .await
            .map_err(|e| DaqError::MalformedRequest(format!("unreadable form body: {e}")))?;
        let from_body = Credentials::parse(&String::from_utf8_lossy(&bytes));
        (
            Request::from_parts(parts, Body::from(bytes)),
            from_body.or(from_query),
        )
    } else {
        (request, from_query)
    };

    let user = credentials.api_user.unwrap_or_default();
    let key = Zeroizing::new(credentials.api_key.unwrap_or_default());

    let authenticator = state.authenticator.clone();
    let checked_user = user.clone();
    state
        .blocking(move || authenticator.authenticate(&checked_user, &key))
        .await?;

    debug!(api_user = %user, "authenticated");
    request.extensions_mut().insert(Operator(user));
    Ok(request)
}
