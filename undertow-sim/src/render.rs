//! Console progress frames.

use std::fmt;
use std::time::Duration;

const BAR_WIDTH: usize = 30;
const MIB: f64 = 1_048_576.0;

/// Lifecycle phase of an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Pieces are still arriving.
    Downloading,
    /// Everything is acquired and the engine will not seed.
    Complete,
    /// Everything is acquired and the engine keeps seeding.
    Seeding,
    /// The engine has been closed.
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Downloading => write!(f, "Downloading"),
            Phase::Complete => write!(f, "Complete"),
            Phase::Seeding => write!(f, "Seeding"),
            Phase::Closed => write!(f, "Closed"),
        }
    }
}

/// Point-in-time view of acquisition progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Current phase
    pub phase: Phase,
    /// Bytes available for streaming
    pub available: u64,
    /// Size of the resource
    pub total: u64,
    /// Time since acquisition started
    pub elapsed: Duration,
    /// Whether playback can begin
    pub ready: bool,
}

impl ProgressSnapshot {
    /// Completed fraction in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.available as f64 / self.total as f64
    }

    /// Average acquisition rate in bytes per second.
    pub fn rate(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds <= 0.0 {
            return 0.0;
        }
        self.available as f64 / seconds
    }

    /// Formats a single-line frame ending in a newline.
    pub fn frame(&self, url: &str) -> String {
        let filled = ((self.fraction() * BAR_WIDTH as f64).floor() as usize).min(BAR_WIDTH);
        let bar = match filled {
            0 => " ".repeat(BAR_WIDTH),
            n if n == BAR_WIDTH => "=".repeat(BAR_WIDTH),
            n => format!("{}>{}", "=".repeat(n - 1), " ".repeat(BAR_WIDTH - n)),
        };
        let marker = if self.ready { "ready" } else { "buffering" };

        format!(
            "[{}] [{bar}] {:5.1}%  {:.1}/{:.1} MiB  {:.1} MiB/s  {marker}  {url}\n",
            self.phase,
            self.fraction() * 100.0,
            self.available as f64 / MIB,
            self.total as f64 / MIB,
            self.rate() / MIB,
        )
    }
}
