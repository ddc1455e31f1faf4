//! Startup failures and shutdown of a full orchestrated run

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use undertow_cli::{ExitStatus, Orchestrator, OrchestratorState};
use undertow_core::shutdown::TerminationSignal;
use undertow_sim::{ControlledEngine, ControlledEngineFactory};

use crate::support::{
    CountingSignalSource, RecordingSpawner, free_addr, localhost, options, orchestrator,
};

#[tokio::test]
async fn test_no_resource_exits_before_anything_starts() {
    let factory = Arc::new(ControlledEngineFactory::failing());
    let addr = free_addr().await;
    let orchestrator = Orchestrator::new(factory.clone(), Arc::new(RecordingSpawner::default()))
        .with_bind_address(addr);

    let signals = CountingSignalSource::default();
    let mut out = Vec::new();
    let status = orchestrator
        .run(options(None, vec![]), || signals.install(), &mut out)
        .await;

    assert_eq!(status, ExitStatus::NoResourceProvided);
    assert_eq!(status.as_code(), 1);
    assert!(factory.requests().is_empty());
    assert!(out.is_empty());
    assert_eq!(signals.installs(), 0);

    // The listener was never bound.
    tokio::net::TcpListener::bind(addr).await.unwrap();
}

#[tokio::test]
async fn test_engine_failure_starts_no_server() {
    let factory = Arc::new(ControlledEngineFactory::failing());
    let addr = free_addr().await;
    let spawner = Arc::new(RecordingSpawner::default());
    let orchestrator = Orchestrator::new(factory.clone(), spawner.clone()).with_bind_address(addr);

    let signals = CountingSignalSource::default();
    let mut out = Vec::new();
    let status = orchestrator
        .run(
            options(Some("missing.torrent"), vec![undertow_core::Viewer::Vlc]),
            || signals.install(),
            &mut out,
        )
        .await;

    assert_eq!(status, ExitStatus::EngineError);
    assert_eq!(status.as_code(), 2);
    assert_eq!(factory.requests().len(), 1);
    assert!(out.is_empty());
    assert!(spawner.launches().is_empty());
    assert_eq!(signals.installs(), 0);
    tokio::net::TcpListener::bind(addr).await.unwrap();
}

#[tokio::test]
async fn test_signal_burst_closes_engine_once() {
    let engine = Arc::new(ControlledEngine::new("data"));
    let factory = Arc::new(ControlledEngineFactory::new(engine.clone()));
    let session = orchestrator(factory, Arc::new(RecordingSpawner::default()))
        .start(options(Some("movie.torrent"), vec![]))
        .await
        .unwrap();

    let (sender, signals) = mpsc::channel(4);
    for signal in TerminationSignal::ALL {
        sender.send(signal).await.unwrap();
    }

    let mut out = io::sink();
    let status = session.run(signals, &mut out).await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(engine.close_count(), 1);
}

#[tokio::test]
async fn test_port_in_use_is_server_error() {
    let taken = tokio::net::TcpListener::bind(localhost()).await.unwrap();
    let engine = Arc::new(ControlledEngine::new("data"));
    let factory = Arc::new(ControlledEngineFactory::new(engine.clone()));
    let orchestrator = Orchestrator::new(factory, Arc::new(RecordingSpawner::default()))
        .with_bind_address(taken.local_addr().unwrap());

    let signals = CountingSignalSource::default();
    let mut out = io::sink();
    let status = orchestrator
        .run(options(Some("movie.torrent"), vec![]), || signals.install(), &mut out)
        .await;

    assert_eq!(status, ExitStatus::ServerError);
    assert_eq!(signals.installs(), 0);
    assert_eq!(engine.close_count(), 1);
    assert_eq!(engine.render_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_renders_once_per_second_until_signaled() {
    let engine = Arc::new(ControlledEngine::new("data"));
    engine.set_ready(true);
    let factory = Arc::new(ControlledEngineFactory::new(engine.clone()));
    let spawner = Arc::new(RecordingSpawner::default());

    let session = orchestrator(factory, spawner.clone())
        .start(options(Some("movie.torrent"), vec![]))
        .await
        .unwrap();
    assert_eq!(session.state(), OrchestratorState::Running);

    let (sender, signals) = mpsc::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(9500)).await;
        sender.send(TerminationSignal::Interrupt).await.ok();
    });

    let mut out = Vec::new();
    let status = session.run(signals, &mut out).await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(engine.render_count(), 10);
    assert_eq!(String::from_utf8(out).unwrap().lines().count(), 10);
    assert!(spawner.launches().is_empty());
}

#[tokio::test]
async fn test_listener_on_requested_port() {
    let engine = Arc::new(ControlledEngine::new("port 9000"));
    let factory = Arc::new(ControlledEngineFactory::new(engine.clone()));

    let mut opts = options(Some("movie.torrent"), vec![]);
    opts.port = 9000;

    let session = Orchestrator::new(factory.clone(), Arc::new(RecordingSpawner::default()))
        .start(opts)
        .await
        .unwrap();
    assert_eq!(session.local_addr().port(), 9000);
    assert!(session.local_addr().ip().is_unspecified());
    assert_eq!(factory.requests()[0].port, 9000);

    let (sender, signals) = mpsc::channel(1);
    let run = tokio::spawn(async move {
        let mut out = io::sink();
        session.run(signals, &mut out).await
    });

    let body = reqwest::get("http://127.0.0.1:9000/")
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "port 9000");

    sender.send(TerminationSignal::Terminate).await.unwrap();
    assert_eq!(run.await.unwrap(), ExitStatus::Success);
}
