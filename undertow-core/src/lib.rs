//! Undertow Core - Playback orchestration primitives
//!
//! This crate provides the building blocks for streaming a resource while it
//! is still being acquired: the engine boundary, configuration, readiness
//! gating, viewer launching, status rendering and signal driven shutdown.

pub mod config;
pub mod engine;
pub mod player;
pub mod readiness;
pub mod shutdown;
pub mod status;
pub mod tracing_setup;

#[cfg(test)]
mod test_mocks;

// Re-export main types for convenient access
pub use config::{ConfigError, PlaybackConfig, UndertowConfig, Viewer};
pub use engine::{
    CloseOutcome, EngineError, EngineFactory, EngineHandle, EngineRequest, StreamingEngine,
};
pub use player::{LaunchError, LaunchOutcome, PlaybackLauncher, ProcessSpawner, ViewerCommand};
pub use readiness::{ReadinessGate, ReadinessOutcome};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal, ShutdownTrigger, TerminationSignal};
pub use status::StatusRenderer;

/// Errors that can bubble up from any Undertow subsystem.
#[derive(Debug, thiserror::Error)]
pub enum UndertowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Server error: {reason}")]
    Server { reason: String },
}

impl UndertowError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            UndertowError::Config(ConfigError::NoResourceProvided) => {
                "No torrent or media source was given".to_string()
            }
            UndertowError::Config(e) => format!("Invalid configuration: {e}"),
            UndertowError::Engine(EngineError::SourceNotFound { resource }) => {
                format!("Could not find {resource}")
            }
            UndertowError::Engine(e) => format!("The streaming engine failed: {e}"),
            UndertowError::Server { reason } => format!("Streaming server failed: {reason}"),
        }
    }

    /// Wraps any displayable server failure.
    pub fn from_server_error(error: impl std::fmt::Display) -> Self {
        UndertowError::Server {
            reason: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, UndertowError>;
