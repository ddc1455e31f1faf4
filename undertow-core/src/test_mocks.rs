//! Mock engine shared by unit tests in this crate.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::engine::{EngineError, StreamingEngine};

/// Engine whose readiness is flipped by the test and whose calls are counted.
#[derive(Default)]
pub(crate) struct MockEngine {
    pub ready: AtomicBool,
    pub readiness_checks: AtomicUsize,
    pub renders: AtomicUsize,
    pub closes: AtomicUsize,
}

impl MockEngine {
    pub fn ready() -> Self {
        let engine = Self::default();
        engine.set_ready(true);
        engine
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamingEngine for MockEngine {
    async fn serve(&self, _request: Request<Body>) -> Response {
        StatusCode::NO_CONTENT.into_response()
    }

    async fn is_ready(&self) -> bool {
        self.readiness_checks.fetch_add(1, Ordering::SeqCst);
        self.ready.load(Ordering::SeqCst)
    }

    fn render(&self, out: &mut dyn Write) -> std::io::Result<()> {
        let frame = self.renders.fetch_add(1, Ordering::SeqCst);
        writeln!(out, "frame {frame}")
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
