//! Viewer launching against readiness and failure

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use undertow_cli::ExitStatus;
use undertow_core::config::Viewer;
use undertow_core::shutdown::TerminationSignal;
use undertow_sim::{ControlledEngine, ControlledEngineFactory};

use crate::support::{RecordingSpawner, eventually, fast_timing, options, orchestrator};

#[tokio::test(start_paused = true)]
async fn test_vlc_launched_after_readiness() {
    let engine = Arc::new(ControlledEngine::new("data"));
    let factory = Arc::new(ControlledEngineFactory::new(engine.clone()));
    let spawner = Arc::new(RecordingSpawner::default());
    let started = Instant::now();

    let session = orchestrator(factory, spawner.clone())
        .start(options(Some("movie.torrent"), vec![Viewer::Vlc]))
        .await
        .unwrap();

    let ready_engine = engine.clone();
    let (sender, signals) = mpsc::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        ready_engine.set_ready(true);
        tokio::time::sleep(Duration::from_secs(3)).await;
        sender.send(TerminationSignal::Interrupt).await.ok();
    });

    let mut out = io::sink();
    let status = session.run(signals, &mut out).await;
    assert_eq!(status, ExitStatus::Success);

    let launches = spawner.launches();
    assert_eq!(launches.len(), 1);

    let (launched_at, command) = &launches[0];
    let first_ready = engine.first_ready_at().unwrap();
    assert!(*launched_at >= first_ready);
    assert!(launched_at.duration_since(started) >= Duration::from_secs(5));
    assert_eq!(command.program(), "vlc");
    assert_eq!(command.args().last().unwrap(), "http://localhost:8080");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_readiness_launches_nothing() {
    let engine = Arc::new(ControlledEngine::new("data"));
    let factory = Arc::new(ControlledEngineFactory::new(engine.clone()));
    let spawner = Arc::new(RecordingSpawner::default());

    let session = orchestrator(factory, spawner.clone())
        .start(options(
            Some("movie.torrent"),
            vec![Viewer::Vlc, Viewer::Mplayer],
        ))
        .await
        .unwrap();

    let (sender, signals) = mpsc::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        sender.send(TerminationSignal::Quit).await.ok();
    });

    let mut out = io::sink();
    assert_eq!(session.run(signals, &mut out).await, ExitStatus::Success);

    // Readiness would arrive now, after shutdown.
    engine.set_ready(true);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(spawner.launches().is_empty());
}

#[tokio::test]
async fn test_spawn_failure_keeps_streaming_and_rendering() {
    let engine = Arc::new(ControlledEngine::new("still streaming"));
    engine.set_ready(true);
    let factory = Arc::new(ControlledEngineFactory::new(engine.clone()));
    let spawner = Arc::new(RecordingSpawner::failing());

    let session = orchestrator(factory, spawner.clone())
        .with_timing(fast_timing())
        .start(options(
            Some("movie.torrent"),
            vec![Viewer::Vlc, Viewer::Mplayer],
        ))
        .await
        .unwrap();
    let addr = session.local_addr();

    let (sender, signals) = mpsc::channel(1);
    let run = tokio::spawn(async move {
        let mut out = Vec::new();
        let status = session.run(signals, &mut out).await;
        (status, out)
    });

    assert!(eventually(Duration::from_secs(5), || spawner.launches().len() == 2).await);

    let mut programs: Vec<String> = spawner
        .launches()
        .iter()
        .map(|(_, command)| command.program().to_string())
        .collect();
    programs.sort();
    assert_eq!(programs, ["mplayer", "vlc"]);

    let rendered = engine.render_count();
    let body = reqwest::get(format!("http://{addr}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "still streaming");
    assert!(eventually(Duration::from_secs(5), || engine.render_count() > rendered + 2).await);

    sender.send(TerminationSignal::Interrupt).await.unwrap();
    let (status, out) = run.await.unwrap();

    assert_eq!(status, ExitStatus::Success);
    assert!(String::from_utf8(out).unwrap().contains("controlled frame"));
    assert_eq!(engine.close_count(), 1);
}
