//! Undertow Simulation - Engines that stand in for a real torrent client.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! [`SimulatedEngine`] acquires a local media file piece by piece at a
//! configurable rate and streams whatever has arrived, which reproduces the
//! timing of a real download without any network. [`ControlledEngine`] is
//! fully scripted by tests.

pub mod controlled;
pub mod engine;
pub mod range;
pub mod render;

pub use controlled::{ControlledEngine, ControlledEngineFactory};
pub use engine::{SimulatedEngine, SimulatedEngineFactory};
pub use range::{ByteRange, parse_range};
pub use render::{Phase, ProgressSnapshot};
