//! Composition root wiring the engine, server, viewers, renderer and
//! shutdown together.
//!
//! Startup is split in two. [`Orchestrator::start`] validates options, opens
//! the engine and binds the listener; nothing runs concurrently until it
//! succeeds. [`Session::run`] then fans out the background tasks and renders
//! progress on the calling task until shutdown.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use undertow_core::UndertowError;
use undertow_core::config::{ConfigError, PlaybackConfig, TimingConfig, Viewer};
use undertow_core::engine::{EngineFactory, EngineHandle, EngineRequest};
use undertow_core::player::{LaunchOutcome, Platform, PlaybackLauncher, ProcessSpawner};
use undertow_core::readiness::ReadinessGate;
use undertow_core::shutdown::{ShutdownCoordinator, TerminationSignal, shutdown_channel};
use undertow_core::status::StatusRenderer;
use undertow_web::{StreamingServer, WebError, listen_address};

/// Process exit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit after a termination signal
    Success,
    /// No resource identifier was given
    NoResourceProvided,
    /// The engine could not be constructed
    EngineError,
    /// The HTTP listener could not be bound or failed
    ServerError,
    /// The command line was rejected
    InvalidArguments,
    /// Process setup failed, e.g. signal handlers could not be installed
    SetupFailed,
}

impl ExitStatus {
    pub fn as_code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::NoResourceProvided => 1,
            ExitStatus::EngineError => 2,
            ExitStatus::ServerError => 3,
            ExitStatus::InvalidArguments => 64,
            ExitStatus::SetupFailed => 70,
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        // Every code fits in a u8.
        std::process::ExitCode::from(status.as_code() as u8)
    }
}

/// Lifecycle of one orchestrated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Configuring,
    EngineStarting,
    Running,
    ShuttingDown,
    Terminated,
}

fn transition(state: &mut OrchestratorState, next: OrchestratorState) {
    debug!("Orchestrator state: {:?} -> {:?}", state, next);
    *state = next;
}

/// Raw startup options before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupOptions {
    pub resource: Option<String>,
    pub port: u16,
    pub seed: bool,
    pub viewers: Vec<Viewer>,
}

/// Builds a running [`Session`] from startup options.
pub struct Orchestrator {
    factory: Arc<dyn EngineFactory>,
    spawner: Arc<dyn ProcessSpawner>,
    timing: TimingConfig,
    platform: Platform,
    bind_address: Option<SocketAddr>,
    state: OrchestratorState,
}

impl Orchestrator {
    pub fn new(factory: Arc<dyn EngineFactory>, spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self {
            factory,
            spawner,
            timing: TimingConfig::default(),
            platform: Platform::current(),
            bind_address: None,
            state: OrchestratorState::Configuring,
        }
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Binds the listener on `addr` instead of all interfaces at the
    /// configured port. Viewers are still pointed at the configured port.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Validates options, opens the engine and binds the listener.
    ///
    /// No task is spawned before this returns `Ok`.
    ///
    /// # Errors
    /// Returns the exit status the process should terminate with:
    /// - `ExitStatus::NoResourceProvided` - Resource missing or blank
    /// - `ExitStatus::InvalidArguments` - Options failed validation
    /// - `ExitStatus::EngineError` - The engine could not be opened
    /// - `ExitStatus::ServerError` - The listener could not be bound
    pub async fn start(mut self, options: StartupOptions) -> Result<Session, ExitStatus> {
        let playback = match PlaybackConfig::new(
            options.resource,
            options.port,
            options.seed,
            options.viewers,
        ) {
            Ok(playback) => playback,
            Err(ConfigError::NoResourceProvided) => {
                debug!("No resource given; nothing to stream");
                return Err(ExitStatus::NoResourceProvided);
            }
            Err(e) => {
                error!("{}", UndertowError::from(e).user_message());
                return Err(ExitStatus::InvalidArguments);
            }
        };

        transition(&mut self.state, OrchestratorState::EngineStarting);

        let request = EngineRequest {
            resource: playback.resource().to_string(),
            port: playback.port(),
            seed: playback.seed(),
        };
        let engine = match self.factory.open(request).await {
            Ok(engine) => EngineHandle::new(engine),
            Err(e) => {
                error!("{}", UndertowError::from(e).user_message());
                return Err(ExitStatus::EngineError);
            }
        };

        let addr = self
            .bind_address
            .unwrap_or_else(|| listen_address(playback.port()));
        let server = match StreamingServer::bind(addr).await {
            Ok(server) => server,
            Err(e) => {
                error!("{}", UndertowError::from_server_error(e).user_message());
                close_engine(&engine).await;
                return Err(ExitStatus::ServerError);
            }
        };

        transition(&mut self.state, OrchestratorState::Running);
        info!(
            "Streaming {} at {}",
            playback.resource(),
            playback.stream_url()
        );

        Ok(Session {
            playback,
            engine,
            server,
            spawner: self.spawner,
            timing: self.timing,
            platform: self.platform,
            state: self.state,
        })
    }

    /// Starts and runs to completion, rendering progress to `out`.
    ///
    /// `signal_source` is called only once startup has succeeded, so a failed
    /// startup never touches process signal handling.
    pub async fn run<S, W>(
        self,
        options: StartupOptions,
        signal_source: S,
        out: &mut W,
    ) -> ExitStatus
    where
        S: FnOnce() -> io::Result<mpsc::Receiver<TerminationSignal>>,
        W: Write + Send,
    {
        let session = match self.start(options).await {
            Ok(session) => session,
            Err(status) => return status,
        };

        match signal_source() {
            Ok(signals) => session.run(signals, out).await,
            Err(e) => {
                error!("Failed to install signal handlers: {e}");
                close_engine(&session.engine).await;
                ExitStatus::SetupFailed
            }
        }
    }
}

/// A started run: engine open and listener bound.
pub struct Session {
    playback: PlaybackConfig,
    engine: EngineHandle,
    server: StreamingServer,
    spawner: Arc<dyn ProcessSpawner>,
    timing: TimingConfig,
    platform: Platform,
    state: OrchestratorState,
}

impl Session {
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Runs until a termination signal arrives or the server fails.
    ///
    /// The server, one launcher per viewer and the shutdown coordinator are
    /// spawned as independent tasks; progress is rendered on this task.
    pub async fn run<W>(
        mut self,
        signals: mpsc::Receiver<TerminationSignal>,
        out: &mut W,
    ) -> ExitStatus
    where
        W: Write + Send,
    {
        let (trigger, mut shutdown) = shutdown_channel();

        let server_shutdown = trigger.subscribe();
        let mut server_task = tokio::spawn(self.server.serve(self.engine.clone(), server_shutdown));

        let gate = ReadinessGate::new(self.timing.readiness_poll_interval);
        let launcher =
            PlaybackLauncher::new(gate, self.spawner.clone()).with_platform(self.platform);
        let launchers: Vec<JoinHandle<LaunchOutcome>> = self
            .playback
            .viewers()
            .iter()
            .map(|&viewer| {
                let launcher = launcher.clone();
                let engine = self.engine.clone();
                let port = self.playback.port();
                let mut shutdown = trigger.subscribe();
                tokio::spawn(async move {
                    launcher
                        .launch_when_ready(&engine, port, viewer, &mut shutdown)
                        .await
                })
            })
            .collect();

        let coordinator = ShutdownCoordinator::new(self.engine.clone(), trigger);
        let coordinator_task = tokio::spawn(coordinator.run(signals));

        let renderer = StatusRenderer::new(self.timing.render_interval);
        let status = tokio::select! {
            frames = renderer.run(&self.engine, out, &mut shutdown) => {
                debug!(frames, "Status renderer stopped");
                ExitStatus::Success
            }
            joined = &mut server_task => match joined {
                Ok(Ok(())) => ExitStatus::Success,
                Ok(Err(e)) => server_failed(&e),
                Err(e) => {
                    error!("Streaming server task failed: {e}");
                    ExitStatus::ServerError
                }
            },
        };

        transition(&mut self.state, OrchestratorState::ShuttingDown);

        if status == ExitStatus::Success {
            match coordinator_task.await {
                Ok(signal) => debug!(%signal, "Shutdown complete"),
                Err(e) => warn!("Shutdown coordinator failed: {e}"),
            }
        } else {
            // The coordinator never ran, so the engine is still open.
            coordinator_task.abort();
            for task in &launchers {
                task.abort();
            }
            close_engine(&self.engine).await;
        }

        server_task.abort();
        transition(&mut self.state, OrchestratorState::Terminated);
        status
    }
}

fn server_failed(e: &WebError) -> ExitStatus {
    error!("{}", UndertowError::from_server_error(e).user_message());
    ExitStatus::ServerError
}

async fn close_engine(engine: &EngineHandle) {
    if let Err(e) = engine.close().await {
        error!("Failed to close engine cleanly: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use undertow_core::player::{LaunchError, ViewerCommand};
    use undertow_sim::{ControlledEngine, ControlledEngineFactory};

    use super::*;

    #[derive(Default)]
    struct RecordingSpawner {
        commands: Mutex<Vec<ViewerCommand>>,
    }

    impl ProcessSpawner for RecordingSpawner {
        fn spawn(&self, command: &ViewerCommand) -> Result<(), LaunchError> {
            self.commands.lock().push(command.clone());
            Ok(())
        }
    }

    fn options(resource: Option<&str>) -> StartupOptions {
        StartupOptions {
            resource: resource.map(str::to_string),
            port: 8080,
            seed: false,
            viewers: vec![],
        }
    }

    fn local() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let statuses = [
            ExitStatus::Success,
            ExitStatus::NoResourceProvided,
            ExitStatus::EngineError,
            ExitStatus::ServerError,
            ExitStatus::InvalidArguments,
            ExitStatus::SetupFailed,
        ];
        let mut codes: Vec<i32> = statuses.iter().map(|s| s.as_code()).collect();
        codes.sort_unstable();
        codes.dedup();

        assert_eq!(codes.len(), statuses.len());
        assert_eq!(ExitStatus::Success.as_code(), 0);
        assert_eq!(ExitStatus::NoResourceProvided.as_code(), 1);
        assert_eq!(ExitStatus::EngineError.as_code(), 2);
    }

    #[tokio::test]
    async fn test_missing_resource_never_opens_engine() {
        let factory = Arc::new(ControlledEngineFactory::failing());
        let orchestrator =
            Orchestrator::new(factory.clone(), Arc::new(RecordingSpawner::default()));
        assert_eq!(orchestrator.state(), OrchestratorState::Configuring);

        let result = orchestrator.start(options(None)).await;

        assert!(matches!(result, Err(ExitStatus::NoResourceProvided)));
        assert!(factory.requests().is_empty());
    }

    #[tokio::test]
    async fn test_zero_port_is_invalid_arguments() {
        let factory = Arc::new(ControlledEngineFactory::failing());
        let orchestrator =
            Orchestrator::new(factory.clone(), Arc::new(RecordingSpawner::default()));

        let mut opts = options(Some("movie.torrent"));
        opts.port = 0;

        let result = orchestrator.start(opts).await;
        assert!(matches!(result, Err(ExitStatus::InvalidArguments)));
        assert!(factory.requests().is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_returns_engine_error() {
        let factory = Arc::new(ControlledEngineFactory::failing());
        let orchestrator = Orchestrator::new(factory.clone(), Arc::new(RecordingSpawner::default()))
            .with_bind_address(local());

        let result = orchestrator.start(options(Some("movie.torrent"))).await;

        assert!(matches!(result, Err(ExitStatus::EngineError)));
        assert_eq!(factory.requests().len(), 1);
        assert_eq!(factory.requests()[0].resource, "movie.torrent");
    }

    #[tokio::test]
    async fn test_start_reaches_running() {
        let engine = Arc::new(ControlledEngine::new("data"));
        let factory = Arc::new(ControlledEngineFactory::new(engine));
        let orchestrator = Orchestrator::new(factory, Arc::new(RecordingSpawner::default()))
            .with_bind_address(local());

        let session = orchestrator.start(options(Some("movie.torrent"))).await.unwrap();

        assert_eq!(session.state(), OrchestratorState::Running);
        assert_ne!(session.local_addr().port(), 0);
        assert!(!session.engine().is_closed());
    }

    #[tokio::test]
    async fn test_bind_failure_closes_engine() {
        let taken = tokio::net::TcpListener::bind(local()).await.unwrap();
        let engine = Arc::new(ControlledEngine::new("data"));
        let factory = Arc::new(ControlledEngineFactory::new(engine.clone()));
        let orchestrator = Orchestrator::new(factory, Arc::new(RecordingSpawner::default()))
            .with_bind_address(taken.local_addr().unwrap());

        let result = orchestrator.start(options(Some("movie.torrent"))).await;

        assert!(matches!(result, Err(ExitStatus::ServerError)));
        assert_eq!(engine.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_ends_run_with_success() {
        let engine = Arc::new(ControlledEngine::new("data"));
        let factory = Arc::new(ControlledEngineFactory::new(engine.clone()));
        let spawner = Arc::new(RecordingSpawner::default());
        let orchestrator = Orchestrator::new(factory, spawner.clone())
            .with_bind_address(local())
            .with_platform(Platform::Unix);

        let mut opts = options(Some("movie.torrent"));
        opts.viewers = vec![Viewer::Vlc];

        let (sender, signals) = mpsc::channel(4);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3500)).await;
            sender.send(TerminationSignal::Terminate).await.ok();
        });

        let mut out = io::sink();
        let status = orchestrator.run(opts, move || Ok(signals), &mut out).await;

        assert_eq!(status, ExitStatus::Success);
        assert_eq!(engine.close_count(), 1);
        assert_eq!(engine.render_count(), 4);
        // Never ready, so the viewer was never started.
        assert!(spawner.commands.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_startup_installs_no_signal_handlers() {
        let engine = Arc::new(ControlledEngine::new("data"));
        let factories = [
            (ControlledEngineFactory::new(engine), None, ExitStatus::NoResourceProvided),
            (
                ControlledEngineFactory::failing(),
                Some("movie.torrent"),
                ExitStatus::EngineError,
            ),
        ];

        for (factory, resource, expected) in factories {
            let installs = AtomicUsize::new(0);
            let spawner = Arc::new(RecordingSpawner::default());
            let orchestrator =
                Orchestrator::new(Arc::new(factory), spawner).with_bind_address(local());

            let mut out = io::sink();
            let status = orchestrator
                .run(
                    options(resource),
                    || {
                        installs.fetch_add(1, Ordering::SeqCst);
                        Ok(mpsc::channel(1).1)
                    },
                    &mut out,
                )
                .await;

            assert_eq!(status, expected);
            assert_eq!(installs.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_signal_installation_failure_closes_engine() {
        let engine = Arc::new(ControlledEngine::new("data"));
        let factory = Arc::new(ControlledEngineFactory::new(engine.clone()));
        let orchestrator = Orchestrator::new(factory, Arc::new(RecordingSpawner::default()))
            .with_bind_address(local());

        let mut out = io::sink();
        let status = orchestrator
            .run(
                options(Some("movie.torrent")),
                || Err(io::Error::other("signal registration refused")),
                &mut out,
            )
            .await;

        assert_eq!(status, ExitStatus::SetupFailed);
        assert_eq!(engine.close_count(), 1);
        assert_eq!(engine.render_count(), 0);
    }
}
