//! Integration tests for Undertow
//!
//! These tests drive the orchestrator end to end: engine construction, the
//! HTTP listener, viewer launching, progress rendering and signal driven
//! shutdown working together.

#[path = "integration/support.rs"]
mod support;

#[path = "integration/orchestrator_lifecycle.rs"]
mod orchestrator_lifecycle;

#[path = "integration/playback_launch.rs"]
mod playback_launch;

#[path = "integration/simulated_streaming.rs"]
mod simulated_streaming;
