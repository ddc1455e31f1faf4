//! Full runs against the file-backed simulated engine

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, RANGE};
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use undertow_cli::ExitStatus;
use undertow_core::config::{AcquisitionConfig, Viewer};
use undertow_core::shutdown::TerminationSignal;
use undertow_sim::SimulatedEngineFactory;

use crate::support::{RecordingSpawner, eventually, fast_timing, options, orchestrator};

const SOURCE_LEN: usize = 1024 * 1024;

fn source_file() -> (NamedTempFile, Vec<u8>) {
    let content: Vec<u8> = (0..SOURCE_LEN).map(|i| (i % 251) as u8).collect();
    let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    file.write_all(&content).unwrap();
    file.flush().unwrap();
    (file, content)
}

fn fast_acquisition() -> AcquisitionConfig {
    AcquisitionConfig {
        piece_size: 64 * 1024,
        download_speed: 16 * 1024 * 1024,
        readiness_fraction: 0.25,
        readiness_min_bytes: 64 * 1024,
    }
}

#[tokio::test]
async fn test_streams_file_and_launches_viewer() {
    let (file, content) = source_file();
    let resource = file.path().to_string_lossy().to_string();
    let factory = Arc::new(SimulatedEngineFactory::new(fast_acquisition()));
    let spawner = Arc::new(RecordingSpawner::default());

    let session = orchestrator(factory, spawner.clone())
        .with_timing(fast_timing())
        .start(options(Some(&resource), vec![Viewer::Mplayer]))
        .await
        .unwrap();
    let addr = session.local_addr();
    let engine = session.engine().clone();

    let (sender, signals) = mpsc::channel(1);
    let run = tokio::spawn(async move {
        let mut out = Vec::new();
        let status = session.run(signals, &mut out).await;
        (status, out)
    });

    let client = reqwest::Client::new();
    let url = format!("http://{addr}/");

    let partial = client
        .get(&url)
        .header(RANGE, "bytes=100-199")
        .send()
        .await
        .unwrap();
    assert_eq!(partial.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        partial.headers()[CONTENT_RANGE],
        format!("bytes 100-199/{SOURCE_LEN}").as_str()
    );
    assert_eq!(partial.headers()[CONTENT_TYPE], "video/mp4");
    assert_eq!(&partial.bytes().await.unwrap()[..], &content[100..200]);

    let full = client.get(&url).send().await.unwrap();
    assert_eq!(full.status(), StatusCode::OK);
    assert_eq!(full.bytes().await.unwrap().len(), SOURCE_LEN);

    assert!(eventually(Duration::from_secs(5), || spawner.launches().len() == 1).await);
    let (_, command) = &spawner.launches()[0];
    assert_eq!(command.program(), "mplayer");
    assert_eq!(command.args(), ["-cache", "2048", "http://localhost:8080"]);

    sender.send(TerminationSignal::Hangup).await.unwrap();
    let (status, out) = run.await.unwrap();

    assert_eq!(status, ExitStatus::Success);
    assert!(engine.is_closed());
    let rendered = String::from_utf8(out).unwrap();
    assert!(rendered.contains("http://localhost:8080"));
    assert!(rendered.contains("MiB"));
}

#[tokio::test]
async fn test_missing_source_is_engine_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.mkv");
    let factory = Arc::new(SimulatedEngineFactory::new(fast_acquisition()));

    let result = orchestrator(factory, Arc::new(RecordingSpawner::default()))
        .start(options(Some(&missing.to_string_lossy()), vec![]))
        .await;

    assert!(matches!(result, Err(ExitStatus::EngineError)));
}
