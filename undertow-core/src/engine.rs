//! Boundary to the acquisition and streaming engine.
//!
//! The engine downloads content in the background and serves whatever is
//! available over HTTP. Orchestration code never touches its internals; it
//! only calls the operations defined here through a shared [`EngineHandle`].

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use thiserror::Error;

/// Operations an acquisition engine exposes to the orchestrator.
///
/// Implementations own their concurrency safety: every method may be called
/// from several tasks at once.
#[async_trait]
pub trait StreamingEngine: Send + Sync {
    /// Answers an HTTP request with the content acquired so far.
    ///
    /// Blocking until requested bytes are available and range semantics are
    /// the engine's responsibility.
    async fn serve(&self, request: Request<Body>) -> Response;

    /// Whether enough content is available to begin playback.
    async fn is_ready(&self) -> bool;

    /// Writes one frame of progress output.
    ///
    /// # Errors
    /// - `std::io::Error` - Writing to the output failed
    fn render(&self, out: &mut dyn Write) -> std::io::Result<()>;

    /// Stops acquisition and releases engine resources.
    ///
    /// # Errors
    /// - `EngineError::Io` - Releasing on-disk resources failed
    async fn close(&self) -> Result<(), EngineError>;
}

/// Parameters an engine is constructed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRequest {
    /// Resource to acquire, e.g. a torrent or a media file
    pub resource: String,
    /// Port the content is streamed on
    pub port: u16,
    /// Whether to keep seeding once acquisition completes
    pub seed: bool,
}

/// Constructs engines from startup parameters.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Opens an engine for the requested resource and starts acquisition.
    ///
    /// # Errors
    /// - `EngineError::SourceNotFound` - Resource does not exist
    /// - `EngineError::InvalidSource` - Resource exists but cannot be streamed
    /// - `EngineError::Io` - Reading the resource failed
    async fn open(&self, request: EngineRequest) -> Result<Arc<dyn StreamingEngine>, EngineError>;
}

/// Errors reported by acquisition engines.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("resource not found: {resource}")]
    SourceNotFound { resource: String },

    #[error("invalid resource: {reason}")]
    InvalidSource { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of asking a handle to close its engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// This call closed the engine.
    Closed,
    /// An earlier call already closed the engine.
    AlreadyClosed,
}

/// Shared handle to the one engine of the process.
///
/// Cloning is cheap and every clone refers to the same engine. The engine is
/// closed at most once no matter how many clones call [`EngineHandle::close`].
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<dyn StreamingEngine>,
    closed: Arc<AtomicBool>,
}

impl EngineHandle {
    pub fn new(engine: Arc<dyn StreamingEngine>) -> Self {
        Self {
            engine,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn serve(&self, request: Request<Body>) -> Response {
        self.engine.serve(request).await
    }

    /// Queries the engine's readiness predicate. Never cached.
    pub async fn is_ready(&self) -> bool {
        self.engine.is_ready().await
    }

    /// Renders one progress frame.
    ///
    /// # Errors
    /// - `std::io::Error` - Writing to the output failed
    pub fn render(&self, out: &mut dyn Write) -> std::io::Result<()> {
        self.engine.render(out)
    }

    /// Closes the engine unless a previous call already did.
    ///
    /// # Errors
    /// - `EngineError` - The engine failed while releasing resources; the
    ///   handle still counts as closed
    pub async fn close(&self) -> Result<CloseOutcome, EngineError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(CloseOutcome::AlreadyClosed);
        }

        self.engine.close().await?;
        Ok(CloseOutcome::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
