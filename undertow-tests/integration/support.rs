//! Shared fixtures for integration tests

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use undertow_cli::{Orchestrator, StartupOptions};
use undertow_core::config::{TimingConfig, Viewer};
use undertow_core::engine::EngineFactory;
use undertow_core::player::{LaunchError, Platform, ProcessSpawner, ViewerCommand};
use undertow_core::shutdown::TerminationSignal;

/// Records viewer launches instead of starting processes.
#[derive(Default)]
pub struct RecordingSpawner {
    launches: Mutex<Vec<(Instant, ViewerCommand)>>,
    fail: bool,
}

impl RecordingSpawner {
    /// Spawner whose every launch fails as if the binary were missing.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn launches(&self) -> Vec<(Instant, ViewerCommand)> {
        self.launches.lock().clone()
    }
}

impl ProcessSpawner for RecordingSpawner {
    fn spawn(&self, command: &ViewerCommand) -> Result<(), LaunchError> {
        self.launches.lock().push((Instant::now(), command.clone()));

        if self.fail {
            return Err(LaunchError::Spawn {
                program: command.program().to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such program"),
            });
        }
        Ok(())
    }
}

/// Stands in for OS signal registration and counts installations.
#[derive(Default)]
pub struct CountingSignalSource {
    installs: AtomicUsize,
}

impl CountingSignalSource {
    /// Hands out a channel that never delivers a signal.
    pub fn install(&self) -> io::Result<mpsc::Receiver<TerminationSignal>> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        Ok(mpsc::channel(1).1)
    }

    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }
}

pub fn localhost() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}

/// A loopback address that was free a moment ago.
pub async fn free_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind(localhost()).await.unwrap();
    listener.local_addr().unwrap()
}

pub fn options(resource: Option<&str>, viewers: Vec<Viewer>) -> StartupOptions {
    StartupOptions {
        resource: resource.map(str::to_string),
        port: 8080,
        seed: false,
        viewers,
    }
}

pub fn fast_timing() -> TimingConfig {
    TimingConfig {
        readiness_poll_interval: Duration::from_millis(20),
        render_interval: Duration::from_millis(20),
    }
}

/// Orchestrator bound to an ephemeral loopback port with Unix viewer
/// invocations.
pub fn orchestrator(
    factory: Arc<dyn EngineFactory>,
    spawner: Arc<dyn ProcessSpawner>,
) -> Orchestrator {
    Orchestrator::new(factory, spawner)
        .with_bind_address(localhost())
        .with_platform(Platform::Unix)
}

/// Polls `condition` every 10ms until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
