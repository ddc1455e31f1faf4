//! File-backed engine that simulates progressive acquisition.
//!
//! The resource identifier names a local media file. A background task makes
//! the file available one piece at a time, front to back, at the configured
//! download speed. HTTP reads past the available prefix wait until the
//! missing pieces have "arrived".

use std::io::{SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderValue, Method, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, stream};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use undertow_core::config::{AcquisitionConfig, stream_url};
use undertow_core::engine::{EngineError, EngineFactory, EngineRequest, StreamingEngine};

use crate::range::{ByteRange, parse_range};
use crate::render::{Phase, ProgressSnapshot};

/// Size of chunks written to HTTP response bodies.
const CHUNK_SIZE: u64 = 64 * 1024; // 64 KiB

/// Opens [`SimulatedEngine`]s for local files.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEngineFactory {
    acquisition: AcquisitionConfig,
}

impl SimulatedEngineFactory {
    /// Creates a factory using the given acquisition parameters.
    pub fn new(acquisition: AcquisitionConfig) -> Self {
        Self { acquisition }
    }
}

#[async_trait]
impl EngineFactory for SimulatedEngineFactory {
    async fn open(&self, request: EngineRequest) -> Result<Arc<dyn StreamingEngine>, EngineError> {
        let engine = SimulatedEngine::open(request, self.acquisition.clone()).await?;
        Ok(Arc::new(engine))
    }
}

/// Engine streaming a local file while simulating its download.
pub struct SimulatedEngine {
    source: PathBuf,
    content_type: String,
    total: u64,
    port: u16,
    seed: bool,
    readiness_threshold: u64,
    started_at: Instant,
    available: watch::Receiver<u64>,
    stop: watch::Sender<bool>,
    acquisition: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SimulatedEngine {
    /// Validates the source file and starts acquiring it.
    ///
    /// # Errors
    /// - `EngineError::SourceNotFound` - The file does not exist
    /// - `EngineError::InvalidSource` - The path is a directory or the file is empty
    /// - `EngineError::Io` - The file metadata could not be read
    pub async fn open(
        request: EngineRequest,
        acquisition: AcquisitionConfig,
    ) -> Result<Self, EngineError> {
        let source = source_path(&request.resource);

        let metadata = match tokio::fs::metadata(&source).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::SourceNotFound {
                    resource: request.resource,
                });
            }
            Err(e) => return Err(EngineError::Io(e)),
        };

        if !metadata.is_file() {
            return Err(EngineError::InvalidSource {
                reason: format!("{} is not a regular file", source.display()),
            });
        }

        let total = metadata.len();
        if total == 0 {
            return Err(EngineError::InvalidSource {
                reason: format!("{} is empty", source.display()),
            });
        }

        let content_type = mime_guess::from_path(&source)
            .first_or_octet_stream()
            .to_string();
        let readiness_threshold = acquisition.readiness_threshold(total);

        let (available_tx, available) = watch::channel(0);
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(acquire(
            total,
            acquisition.piece_size.max(1),
            acquisition.piece_interval(),
            request.seed,
            available_tx,
            stop_rx,
        ));

        info!(
            "Acquiring {} ({:.1} MiB, {content_type}), playable after {:.1} MiB",
            source.display(),
            total as f64 / 1_048_576.0,
            readiness_threshold as f64 / 1_048_576.0,
        );

        Ok(Self {
            source,
            content_type,
            total,
            port: request.port,
            seed: request.seed,
            readiness_threshold,
            started_at: Instant::now(),
            available,
            stop,
            acquisition: Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
        })
    }

    /// Current acquisition progress.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let available = *self.available.borrow();
        let phase = if self.closed.load(Ordering::Acquire) {
            Phase::Closed
        } else if available < self.total {
            Phase::Downloading
        } else if self.seed {
            Phase::Seeding
        } else {
            Phase::Complete
        };

        ProgressSnapshot {
            phase,
            available,
            total: self.total,
            elapsed: self.started_at.elapsed(),
            ready: available >= self.readiness_threshold,
        }
    }

    /// Size of the source file.
    pub fn total_size(&self) -> u64 {
        self.total
    }

    /// Bytes required before playback is possible.
    pub fn readiness_threshold(&self) -> u64 {
        self.readiness_threshold
    }

    fn range_headers(&self, status: StatusCode, length: u64) -> axum::http::response::Builder {
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, &self.content_type)
            .header(header::CONTENT_LENGTH, length.to_string())
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CACHE_CONTROL, "no-cache")
    }
}

#[async_trait]
impl StreamingEngine for SimulatedEngine {
    async fn serve(&self, request: Request<Body>) -> Response {
        if self.closed.load(Ordering::Acquire) {
            return (StatusCode::SERVICE_UNAVAILABLE, "engine closed").into_response();
        }

        let method = request.method().clone();
        if method != Method::GET && method != Method::HEAD {
            return (
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, HeaderValue::from_static("GET, HEAD"))],
            )
                .into_response();
        }

        let range_header = request
            .headers()
            .get(header::RANGE)
            .and_then(|value| value.to_str().ok());
        let range = parse_range(range_header, self.total);

        let (start, length, builder) = match range {
            ByteRange::Unsatisfiable => {
                return (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    [(header::CONTENT_RANGE, format!("bytes */{}", self.total))],
                )
                    .into_response();
            }
            ByteRange::Full => (0, self.total, self.range_headers(StatusCode::OK, self.total)),
            ByteRange::Partial { start, end } => {
                let length = range.len(self.total);
                let builder = self
                    .range_headers(StatusCode::PARTIAL_CONTENT, length)
                    .header(
                        header::CONTENT_RANGE,
                        format!("bytes {start}-{end}/{}", self.total),
                    );
                (start, length, builder)
            }
        };

        debug!(%method, start, length, "Serving content");

        let body = if method == Method::HEAD {
            Body::empty()
        } else {
            let file = match open_at(&self.source, start).await {
                Ok(file) => file,
                Err(e) => {
                    warn!("Failed to open {}: {e}", self.source.display());
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            };
            Body::from_stream(chunk_stream(file, self.available.clone(), start, start + length))
        };

        builder
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }

    async fn is_ready(&self) -> bool {
        *self.available.borrow() >= self.readiness_threshold
    }

    fn render(&self, out: &mut dyn Write) -> std::io::Result<()> {
        out.write_all(self.snapshot().frame(&stream_url(self.port)).as_bytes())
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.closed.store(true, Ordering::Release);
        self.stop.send_replace(true);

        let task = self.acquisition.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Acquisition task ended abnormally: {e}");
            }
        }

        info!("Engine closed");
        Ok(())
    }
}

/// Maps a resource identifier to a filesystem path.
fn source_path(resource: &str) -> PathBuf {
    PathBuf::from(resource.strip_prefix("file://").unwrap_or(resource))
}

async fn open_at(path: &Path, offset: u64) -> std::io::Result<tokio::fs::File> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    Ok(file)
}

/// Advances the available prefix one piece per tick until done or stopped.
async fn acquire(
    total: u64,
    piece_size: u64,
    piece_interval: std::time::Duration,
    seed: bool,
    available: watch::Sender<u64>,
    mut stop: watch::Receiver<bool>,
) {
    let mut acquired = 0;

    while acquired < total {
        tokio::select! {
            _ = tokio::time::sleep(piece_interval) => {}
            _ = stop.changed() => {
                debug!(acquired, "Acquisition stopped");
                return;
            }
        }

        acquired = (acquired + piece_size).min(total);
        available.send_replace(acquired);
    }

    if seed {
        info!("Download complete, seeding");
    } else {
        info!("Download complete");
    }
}

struct ChunkReader {
    file: tokio::fs::File,
    available: watch::Receiver<u64>,
    position: u64,
    end: u64,
}

/// Streams `[start, end)` of the file, waiting for each chunk to be acquired.
fn chunk_stream(
    file: tokio::fs::File,
    available: watch::Receiver<u64>,
    start: u64,
    end: u64,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
    let reader = ChunkReader {
        file,
        available,
        position: start,
        end,
    };

    stream::unfold(reader, |mut reader| async move {
        if reader.position >= reader.end {
            return None;
        }

        let length = CHUNK_SIZE.min(reader.end - reader.position);
        let needed = reader.position + length;

        let arrived = reader
            .available
            .wait_for(|available| *available >= needed)
            .await
            .is_ok();

        let result = if arrived {
            let mut buffer = vec![0; length as usize];
            reader
                .file
                .read_exact(&mut buffer)
                .await
                .map(|_| Bytes::from(buffer))
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "acquisition stopped before data became available",
            ))
        };

        // Stop after the first error so the client sees a truncated body
        reader.position = match result {
            Ok(_) => needed,
            Err(_) => reader.end,
        };
        Some((result, reader))
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::NamedTempFile;

    use super::*;

    fn acquisition(piece_size: u64, speed: u64) -> AcquisitionConfig {
        AcquisitionConfig {
            piece_size,
            download_speed: speed,
            readiness_fraction: 0.25,
            readiness_min_bytes: 0,
        }
    }

    fn source_file(len: usize) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        file
    }

    fn request(file: &NamedTempFile, seed: bool) -> EngineRequest {
        EngineRequest {
            resource: file.path().display().to_string(),
            port: 8080,
            seed,
        }
    }

    #[tokio::test]
    async fn test_missing_source_is_not_found() {
        let request = EngineRequest {
            resource: "/definitely/not/here.mkv".to_string(),
            port: 8080,
            seed: false,
        };

        let result = SimulatedEngine::open(request, AcquisitionConfig::default()).await;
        assert!(matches!(result, Err(EngineError::SourceNotFound { .. })));
    }

    #[tokio::test]
    async fn test_directory_and_empty_sources_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let request = EngineRequest {
            resource: dir.path().display().to_string(),
            port: 8080,
            seed: false,
        };
        let result = SimulatedEngine::open(request, AcquisitionConfig::default()).await;
        assert!(matches!(result, Err(EngineError::InvalidSource { .. })));

        let empty = source_file(0);
        let result = SimulatedEngine::open(request_for(&empty), AcquisitionConfig::default()).await;
        assert!(matches!(result, Err(EngineError::InvalidSource { .. })));
    }

    fn request_for(file: &NamedTempFile) -> EngineRequest {
        request(file, false)
    }

    #[tokio::test]
    async fn test_file_scheme_prefix_accepted() {
        let file = source_file(1024);
        let request = EngineRequest {
            resource: format!("file://{}", file.path().display()),
            port: 8080,
            seed: false,
        };

        let engine = SimulatedEngine::open(request, acquisition(1024, 1 << 30))
            .await
            .unwrap();
        assert_eq!(engine.total_size(), 1024);
        engine.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_becomes_ready_after_threshold() {
        let file = source_file(4096);
        // 1 KiB pieces every 100ms, ready at 25% = 1 KiB
        let engine = SimulatedEngine::open(request_for(&file), acquisition(1024, 10_240))
            .await
            .unwrap();

        assert_eq!(engine.readiness_threshold(), 1024);
        assert!(!engine.is_ready().await);
        assert_eq!(engine.snapshot().phase, Phase::Downloading);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(engine.is_ready().await);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.available, 4096);
        assert_eq!(snapshot.phase, Phase::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seed_flag_reported_after_completion() {
        let file = source_file(2048);
        let engine = SimulatedEngine::open(request(&file, true), acquisition(1024, 10_240))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(engine.snapshot().phase, Phase::Seeding);

        let mut out = Vec::new();
        engine.render(&mut out).unwrap();
        let frame = String::from_utf8(out).unwrap();
        assert!(frame.starts_with("[Seeding]"));
        assert!(frame.contains("http://localhost:8080"));
    }

    #[tokio::test]
    async fn test_serves_range_once_available() {
        let file = source_file(100_000);
        let engine = SimulatedEngine::open(request_for(&file), acquisition(10_000, 10_000_000))
            .await
            .unwrap();

        let request = Request::builder()
            .uri("/")
            .header(header::RANGE, "bytes=10-19")
            .body(Body::empty())
            .unwrap();
        let response = engine.serve(request).await;

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes 10-19/100000"
        );
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "video/mp4");

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(body.to_vec(), (10..20u8).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_body_waits_for_acquisition() {
        let file = source_file(300_000);
        let engine = SimulatedEngine::open(request_for(&file), acquisition(100_000, 1_000_000))
            .await
            .unwrap();

        let started = Instant::now();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = engine.serve(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "300000");

        let body = axum::body::to_bytes(response.into_body(), 1_000_000).await.unwrap();
        assert_eq!(body.len(), 300_000);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_rejects_bad_method_and_range() {
        let file = source_file(100);
        let engine = SimulatedEngine::open(request_for(&file), acquisition(100, 1 << 30))
            .await
            .unwrap();

        let post = Request::builder()
            .method(Method::POST)
            .uri("/")
            .body(Body::empty())
            .unwrap();
        assert_eq!(engine.serve(post).await.status(), StatusCode::METHOD_NOT_ALLOWED);

        let out_of_range = Request::builder()
            .uri("/")
            .header(header::RANGE, "bytes=500-600")
            .body(Body::empty())
            .unwrap();
        let response = engine.serve(out_of_range).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers().get(header::CONTENT_RANGE).unwrap(), "bytes */100");
    }

    #[tokio::test]
    async fn test_head_returns_headers_only() {
        let file = source_file(512);
        let engine = SimulatedEngine::open(request_for(&file), acquisition(512, 1 << 30))
            .await
            .unwrap();

        let head = Request::builder()
            .method(Method::HEAD)
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let response = engine.serve(head).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "512");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_acquisition_and_serving() {
        let file = source_file(10_000);
        let engine = SimulatedEngine::open(request_for(&file), acquisition(1_000, 1_000))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        engine.close().await.unwrap();
        let stopped_at = engine.snapshot().available;
        assert_eq!(stopped_at, 2_000);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.available, stopped_at);
        assert_eq!(snapshot.phase, Phase::Closed);

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(engine.serve(request).await.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
