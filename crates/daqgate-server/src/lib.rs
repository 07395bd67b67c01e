//! `daqgate-server` – the HTTP command API.
//!
//! Exposes the admission engine, status readouts and the DAQ log over a
//! small form/JSON API.  Every endpoint authenticates with an
//! `api_user`/`api_key` pair supplied in the query string or form body.
//!
//! Store access from handlers always goes through
//! [`AppState::blocking`], which moves the synchronous store call onto the
//! blocking pool and bounds it with the configured store timeout.

pub mod auth;
pub mod error;
pub mod request;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use routes::router;
pub use server::{ApiServer, DEFAULT_PORT, ServerError};
pub use state::{AppState, ServerSettings};
