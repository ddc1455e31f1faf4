//! Undertow CLI - Command-line player
//!
//! Parses the command line and runs the orchestrator that streams a resource
//! over HTTP while it downloads.

pub mod cli;
pub mod orchestrator;

pub use cli::Cli;
pub use orchestrator::{ExitStatus, Orchestrator, OrchestratorState, Session, StartupOptions};
