//! Launching external media players once playback is possible.
//!
//! A launch is fire-and-forget: the viewer process is started after the
//! readiness gate opens and is never restarted. Failing to start it is
//! logged and otherwise ignored so streaming keeps running.

use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{Viewer, stream_url};
use crate::engine::EngineHandle;
use crate::readiness::{ReadinessGate, ReadinessOutcome};
use crate::shutdown::ShutdownSignal;

/// Cache size in kilobytes requested from mplayer.
const MPLAYER_CACHE_KB: &str = "2048";

/// Host platform flavour that decides how a viewer binary is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Viewer binaries are invoked directly.
    Unix,
    /// Application bundles are started through `open -a`.
    MacOs,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Unix
        }
    }
}

/// Program and arguments used to start a viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerCommand {
    program: String,
    args: Vec<String>,
}

impl ViewerCommand {
    /// Builds the invocation for `viewer` playing `url` on `platform`.
    ///
    /// The URL is always the final argument.
    pub fn new(viewer: Viewer, url: &str, platform: Platform) -> Self {
        match (viewer, platform) {
            (Viewer::Vlc, Platform::Unix) => Self::from_parts("vlc", [url]),
            (Viewer::Vlc, Platform::MacOs) => Self::from_parts("open", ["-a", "vlc", url]),
            (Viewer::Mplayer, _) => Self::from_parts("mplayer", ["-cache", MPLAYER_CACHE_KB, url]),
        }
    }

    pub fn from_parts<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl std::fmt::Display for ViewerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Errors starting a viewer process.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Starts viewer processes.
pub trait ProcessSpawner: Send + Sync {
    /// Starts the process without waiting for it to finish.
    ///
    /// # Errors
    /// - `LaunchError::Spawn` - The program could not be started
    fn spawn(&self, command: &ViewerCommand) -> Result<(), LaunchError>;
}

/// Spawns real OS processes and logs their exit in the background.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSpawner;

impl ProcessSpawner for SystemSpawner {
    fn spawn(&self, command: &ViewerCommand) -> Result<(), LaunchError> {
        let mut child = tokio::process::Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: command.program().to_string(),
                source,
            })?;

        let program = command.program().to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => info!("{program} exited"),
                Ok(status) => warn!("{program} exited with {status}"),
                Err(e) => warn!("Lost track of {program}: {e}"),
            }
        });

        Ok(())
    }
}

/// How a launch attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Launched,
    SpawnFailed,
    Cancelled,
}

/// Waits for readiness, then starts a viewer pointed at the stream.
#[derive(Clone)]
pub struct PlaybackLauncher {
    gate: ReadinessGate,
    spawner: Arc<dyn ProcessSpawner>,
    platform: Platform,
}

impl PlaybackLauncher {
    pub fn new(gate: ReadinessGate, spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self {
            gate,
            spawner,
            platform: Platform::current(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Launches `viewer` on `http://localhost:<port>` once the engine is ready.
    ///
    /// The viewer is never started before the readiness predicate has
    /// returned true, and never at all if shutdown comes first.
    pub async fn launch_when_ready(
        &self,
        engine: &EngineHandle,
        port: u16,
        viewer: Viewer,
        shutdown: &mut ShutdownSignal,
    ) -> LaunchOutcome {
        if self.gate.wait_until_ready(engine, shutdown).await == ReadinessOutcome::Cancelled {
            info!("Shutdown before {viewer} could be started");
            return LaunchOutcome::Cancelled;
        }

        let command = ViewerCommand::new(viewer, &stream_url(port), self.platform);
        info!("Playing in {viewer}");

        match self.spawner.spawn(&command) {
            Ok(()) => LaunchOutcome::Launched,
            Err(e) => {
                error!("Error opening {viewer}: {e}");
                LaunchOutcome::SpawnFailed
            }
        }
    }
}
