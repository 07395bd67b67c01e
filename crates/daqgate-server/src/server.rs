//! [`ApiServer`] – binds the listener and serves the router until shutdown.
//!
//! Listens on `0.0.0.0:12345` (configurable via [`ApiServer::with_addr`]).

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::router;
use crate::state::AppState;

/// Default TCP port for the command API.
pub const DEFAULT_PORT: u16 = 12345;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("bind error on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// HTTP server for the command API.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use daqgate_server::{ApiServer, AppState, ServerSettings};
/// use daqgate_store::DaqStore;
///
/// #[tokio::main]
/// async fn main() {
///     let store = Arc::new(DaqStore::open_in_memory().unwrap());
///     ApiServer::new(AppState::from_store(store, ServerSettings::default()))
///         .run(async { tokio::signal::ctrl_c().await.ok(); })
///         .await
///         .expect("api server failed");
/// }
/// ```
pub struct ApiServer {
    state: Arc<AppState>,
    addr: SocketAddr,
}

impl ApiServer {
    /// Create a server over `state` on all interfaces at [`DEFAULT_PORT`].
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
        }
    }

    /// Override the listening address (builder-style).
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests.
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] if the listener cannot bind, [`ServerError::Serve`]
    /// if serving fails afterwards.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.addr,
                source,
            })?;
        let local = listener.local_addr()?;
        info!(addr = %local, "command API listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("command API stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServerSettings;
    use daqgate_store::DaqStore;

    fn server() -> ApiServer {
        let store = Arc::new(DaqStore::open_in_memory().unwrap());
        ApiServer::new(AppState::from_store(store, ServerSettings::default()))
    }

    #[test]
    fn default_port_is_12345() {
        assert_eq!(server().addr().port(), DEFAULT_PORT);
    }

    #[test]
    fn with_addr_overrides_default() {
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(server().with_addr(addr).addr(), addr);
    }

    #[tokio::test]
    async fn stops_when_shutdown_resolves() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let result = server().with_addr(addr).run(async {}).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn occupied_port_is_a_bind_error() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();
        let err = server().with_addr(addr).run(async {}).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { addr: a, .. } if a == addr));
    }
}
