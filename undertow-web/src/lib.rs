//! Undertow Web - HTTP streaming endpoint

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
//!
//! Exposes the engine's content at `http://<host>:<port>/` while it is still
//! being acquired. Every request is handed to the engine untouched.

pub mod server;

// Re-export main types
pub use server::{StreamingServer, WebError, listen_address, router};
