//! Streaming HTTP server
//!
//! A single route at `/`, any method, whose handler delegates the whole
//! request to the engine. Unknown paths fall through to the same handler.

use std::future::IntoFuture;
use std::net::{Ipv4Addr, SocketAddr};

use axum::Router;
use axum::extract::{Request, State};
use axum::response::Response;
use axum::routing::any;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use undertow_core::engine::EngineHandle;
use undertow_core::shutdown::ShutdownSignal;

/// Errors that end the streaming server.
#[derive(Debug, Error)]
pub enum WebError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: SocketAddr,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// The accept loop failed after binding.
    #[error("server failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Address the server listens on for `port`: all interfaces.
pub fn listen_address(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// Builds the router that forwards every request to `engine`.
pub fn router(engine: EngineHandle) -> Router {
    Router::new()
        .route("/", any(delegate))
        .fallback(delegate)
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

async fn delegate(State(engine): State<EngineHandle>, request: Request) -> Response {
    engine.serve(request).await
}

/// Bound HTTP listener serving engine content.
pub struct StreamingServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl StreamingServer {
    /// Binds the listener.
    ///
    /// # Errors
    /// - `WebError::Bind` - Port in use, insufficient privilege or bad address
    pub async fn bind(addr: SocketAddr) -> Result<Self, WebError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| WebError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| WebError::Bind { addr, source })?;

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until the listener fails or shutdown fires.
    ///
    /// In-flight responses are not awaited on shutdown; the process is about
    /// to exit.
    ///
    /// # Errors
    /// - `WebError::Serve` - The accept loop failed
    pub async fn serve(
        self,
        engine: EngineHandle,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), WebError> {
        info!("Streaming on http://{}", self.local_addr);
        let server = axum::serve(self.listener, router(engine)).into_future();

        tokio::select! {
            result = server => result.map_err(WebError::Serve),
            _ = shutdown.recv() => {
                info!("Streaming server stopped");
                Ok(())
            }
        }
    }
}
