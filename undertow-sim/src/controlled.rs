//! Scripted engine for deterministic tests.
//!
//! Readiness is flipped explicitly and every call is counted, which lets
//! tests assert ordering properties such as "the viewer never starts before
//! readiness" or "close runs exactly once".

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;
use undertow_core::engine::{EngineError, EngineFactory, EngineRequest, StreamingEngine};

/// Engine whose behaviour is driven entirely by the test.
#[derive(Debug, Default)]
pub struct ControlledEngine {
    content: Bytes,
    ready: AtomicBool,
    first_ready_at: Mutex<Option<Instant>>,
    serves: AtomicUsize,
    renders: AtomicUsize,
    closes: AtomicUsize,
}

impl ControlledEngine {
    /// Creates an engine serving `content` that is not yet ready.
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Sets the value the readiness predicate returns.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// When the readiness predicate first returned true, if it has.
    pub fn first_ready_at(&self) -> Option<Instant> {
        *self.first_ready_at.lock()
    }

    /// Number of requests served.
    pub fn serve_count(&self) -> usize {
        self.serves.load(Ordering::SeqCst)
    }

    /// Number of progress frames rendered.
    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    /// Number of times the engine was closed.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamingEngine for ControlledEngine {
    async fn serve(&self, _request: Request<Body>) -> Response {
        self.serves.fetch_add(1, Ordering::SeqCst);
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            self.content.clone(),
        )
            .into_response()
    }

    async fn is_ready(&self) -> bool {
        let ready = self.ready.load(Ordering::SeqCst);
        if ready {
            self.first_ready_at.lock().get_or_insert_with(Instant::now);
        }
        ready
    }

    fn render(&self, out: &mut dyn Write) -> std::io::Result<()> {
        let frame = self.renders.fetch_add(1, Ordering::SeqCst);
        writeln!(out, "controlled frame {frame}")
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one shared [`ControlledEngine`], or fails on demand.
#[derive(Debug)]
pub struct ControlledEngineFactory {
    engine: Option<Arc<ControlledEngine>>,
    requests: Mutex<Vec<EngineRequest>>,
}

impl ControlledEngineFactory {
    /// Factory that returns `engine` on every open.
    pub fn new(engine: Arc<ControlledEngine>) -> Self {
        Self {
            engine: Some(engine),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Factory whose every open fails with `EngineError::SourceNotFound`.
    pub fn failing() -> Self {
        Self {
            engine: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request the factory has been asked to open.
    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl EngineFactory for ControlledEngineFactory {
    async fn open(&self, request: EngineRequest) -> Result<Arc<dyn StreamingEngine>, EngineError> {
        self.requests.lock().push(request.clone());

        match &self.engine {
            Some(engine) => Ok(engine.clone()),
            None => Err(EngineError::SourceNotFound {
                resource: request.resource,
            }),
        }
    }
}
