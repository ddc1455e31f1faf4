//! Periodic console progress output.

use std::io::Write;
use std::time::Duration;

use tracing::warn;

use crate::engine::EngineHandle;
use crate::shutdown::ShutdownSignal;

/// Renders engine progress at a fixed interval until shutdown.
#[derive(Debug, Clone, Copy)]
pub struct StatusRenderer {
    interval: Duration,
}

impl StatusRenderer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Renders a frame, sleeps one interval, repeats.
    ///
    /// Write failures are logged and do not stop the loop. Returns the number
    /// of frames rendered once shutdown is observed.
    pub async fn run<W>(
        &self,
        engine: &EngineHandle,
        out: &mut W,
        shutdown: &mut ShutdownSignal,
    ) -> u64
    where
        W: Write + Send,
    {
        let mut frames = 0;

        loop {
            if shutdown.is_shutdown() {
                return frames;
            }

            if let Err(e) = engine.render(&mut *out).and_then(|()| out.flush()) {
                warn!("Failed to render status: {e}");
            }
            frames += 1;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.recv() => return frames,
            }
        }
    }
}

impl Default for StatusRenderer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
