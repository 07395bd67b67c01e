//! Route table and handlers.
//!
//! | method | path                          | success body              |
//! |--------|-------------------------------|---------------------------|
//! | GET    | `/helloworld`                 | `{message}`               |
//! | GET    | `/getcommand/{detector}`      | control document          |
//! | POST   | `/setcommand/{detector}`      | `{message}`               |
//! | GET    | `/getstatus/{host}`           | host status or a list     |
//! | GET    | `/detector_status/{detector}` | latest detector status    |
//! | GET    | `/geterrors`                  | log entries, newest first |
//!
//! Every route sits behind [`require_api_key`].

use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Extension, Form, Path, Query, State};
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use chrono::Utc;
use daqgate_kernel::HostStatusReadout;
use daqgate_types::{ControlDocument, DaqError, DetectorStatus, LogEntry};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::{Operator, require_api_key};
use crate::error::ApiError;
use crate::request::{ErrorsQuery, SetCommandForm, StatusQuery};
use crate::state::AppState;

type AppStateArc = Arc<AppState>;

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

/// Build the complete router over `state`.
pub fn router(state: AppStateArc) -> Router {
    Router::new()
        .route("/helloworld", get(hello_world))
        .route("/getcommand/:detector", get(get_command))
        .route("/setcommand/:detector", post(set_command))
        .route("/getstatus/:host", get(get_status))
        .route("/detector_status/:detector", get(detector_status))
        .route("/geterrors", get(get_errors))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    request_id = %Uuid::new_v4(),
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}

async fn hello_world() -> Json<Message> {
    Json(Message {
        message: format!(
            "Hello to you too. The current time is {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        ),
    })
}

async fn get_command(
    State(state): State<AppStateArc>,
    Path(detector): Path<String>,
) -> Result<Json<ControlDocument>, ApiError> {
    let admission = state.admission.clone();
    let doc = state
        .blocking(move || admission.current(&detector))
        .await?;
    Ok(Json(doc))
}

async fn set_command(
    State(state): State<AppStateArc>,
    Path(detector): Path<String>,
    Extension(Operator(user)): Extension<Operator>,
    form: Result<Form<SetCommandForm>, FormRejection>,
) -> Result<Json<Message>, ApiError> {
    let Form(form) = form.map_err(|e| DaqError::MalformedRequest(e.body_text()))?;
    let request = form.into_request(detector, user)?;

    let admission = state.admission.clone();
    let budget = state.store_timeout;
    state
        .blocking_to_completion(move || {
            admission.request_transition_within(&request, Utc::now(), budget)
        })
        .await?;
    Ok(Json(Message {
        message: "Update success!".to_string(),
    }))
}

async fn get_status(
    State(state): State<AppStateArc>,
    Path(host): Path<String>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|e| DaqError::MalformedRequest(e.body_text()))?;
    let window_secs = query.window_secs()?;

    let status = state.status.clone();
    let readout = state
        .blocking(move || Ok(status.host_status(&host, window_secs, Utc::now())?))
        .await?;
    Ok(match readout {
        HostStatusReadout::Latest(doc) => Json(doc).into_response(),
        HostStatusReadout::Window(docs) => Json(docs).into_response(),
    })
}

async fn detector_status(
    State(state): State<AppStateArc>,
    Path(detector): Path<String>,
) -> Result<Json<DetectorStatus>, ApiError> {
    let status = state.status.clone();
    let bound = state.status_staleness;
    let doc = state
        .blocking(move || Ok(status.latest_detector_status(&detector, bound, Utc::now())?))
        .await?;
    Ok(Json(doc))
}

async fn get_errors(
    State(state): State<AppStateArc>,
    query: Result<Query<ErrorsQuery>, QueryRejection>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let Query(query) = query.map_err(|e| DaqError::MalformedRequest(e.body_text()))?;
    let min = query.severity(state.default_log_level)?;

    let logs = state.logs.clone();
    let entries = state.blocking(move || Ok(logs.recent(min)?)).await?;
    Ok(Json(entries))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
