//! Centralized configuration for Undertow.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

/// Port the streaming endpoint listens on when none is given.
pub const DEFAULT_PORT: u16 = 8080;

/// Upper bound on the time to acquire a single piece.
pub const MAX_PIECE_INTERVAL: Duration = Duration::from_secs(3600);

/// Errors raised while validating startup configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no resource identifier provided")]
    NoResourceProvided,

    #[error("invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16 },
}

/// External media player that can be launched once playback is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Viewer {
    Vlc,
    Mplayer,
}

impl std::fmt::Display for Viewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vlc => write!(f, "vlc"),
            Self::Mplayer => write!(f, "mplayer"),
        }
    }
}

/// Immutable playback settings built once from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackConfig {
    resource: String,
    port: u16,
    seed: bool,
    viewers: Vec<Viewer>,
}

impl PlaybackConfig {
    /// Validates startup options and builds the playback configuration.
    ///
    /// Viewers are deduplicated so each player is launched at most once.
    ///
    /// # Errors
    /// - `ConfigError::NoResourceProvided` - Resource missing or blank
    /// - `ConfigError::InvalidPort` - Port is zero
    pub fn new(
        resource: Option<String>,
        port: u16,
        seed: bool,
        viewers: Vec<Viewer>,
    ) -> Result<Self, ConfigError> {
        let resource = resource
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or(ConfigError::NoResourceProvided)?;

        if port == 0 {
            return Err(ConfigError::InvalidPort { port });
        }

        let mut unique = Vec::with_capacity(viewers.len());
        for viewer in viewers {
            if !unique.contains(&viewer) {
                unique.push(viewer);
            }
        }

        Ok(Self {
            resource,
            port,
            seed,
            viewers: unique,
        })
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn seed(&self) -> bool {
        self.seed
    }

    pub fn viewers(&self) -> &[Viewer] {
        &self.viewers
    }

    /// URL external viewers are pointed at.
    pub fn stream_url(&self) -> String {
        stream_url(self.port)
    }
}

/// Builds the local streaming URL for a port.
pub fn stream_url(port: u16) -> String {
    format!("http://localhost:{port}")
}

/// Intervals of the periodic loops.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// How often the readiness predicate is polled
    pub readiness_poll_interval: Duration,
    /// How often progress is rendered to the console
    pub render_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            readiness_poll_interval: Duration::from_secs(1),
            render_interval: Duration::from_secs(1),
        }
    }
}

/// Acquisition parameters for engines that simulate downloading.
///
/// Controls piece granularity, throughput and the amount of data that
/// must be present before playback is considered possible.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Size of one acquired piece in bytes
    pub piece_size: u64,
    /// Simulated download speed in bytes per second
    pub download_speed: u64,
    /// Fraction of the resource required before playback
    pub readiness_fraction: f64,
    /// Lower bound on bytes required before playback
    pub readiness_min_bytes: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            // 256 KiB pieces at 4 MiB/s
            piece_size: 256 * 1024,
            download_speed: 4 * 1_048_576,
            // Playable once 5% of the file, and at least 2 MiB, is present
            readiness_fraction: 0.05,
            readiness_min_bytes: 2 * 1_048_576,
        }
    }
}

impl AcquisitionConfig {
    /// Bytes that must be available before a resource of `total` bytes is ready.
    pub fn readiness_threshold(&self, total: u64) -> u64 {
        let fractional = (total as f64 * self.readiness_fraction).ceil() as u64;
        fractional.max(self.readiness_min_bytes).min(total)
    }

    /// Time needed to acquire one piece at the configured speed, capped at
    /// [`MAX_PIECE_INTERVAL`].
    pub fn piece_interval(&self) -> Duration {
        let speed = self.download_speed.max(1);
        let seconds = self.piece_size as f64 / speed as f64;
        Duration::try_from_secs_f64(seconds)
            .map_or(MAX_PIECE_INTERVAL, |interval| interval.min(MAX_PIECE_INTERVAL))
    }
}

/// Runtime tuning shared by all Undertow components.
///
/// Playback options come from the command line and are validated separately
/// into a [`PlaybackConfig`]; everything here has a working default.
#[derive(Debug, Clone, Default)]
pub struct UndertowConfig {
    pub timing: TimingConfig,
    pub acquisition: AcquisitionConfig,
}

impl UndertowConfig {
    /// Creates configuration with environment variable overrides.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// Zero and unparsable values are ignored and the default is kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let number = |key: &str| {
            lookup(key)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|value| *value > 0)
        };

        if let Some(ms) = number("UNDERTOW_POLL_INTERVAL_MS") {
            config.timing.readiness_poll_interval = Duration::from_millis(ms);
        }

        if let Some(ms) = number("UNDERTOW_RENDER_INTERVAL_MS") {
            config.timing.render_interval = Duration::from_millis(ms);
        }

        if let Some(size) = number("UNDERTOW_PIECE_SIZE") {
            config.acquisition.piece_size = size;
        }

        if let Some(speed) = number("UNDERTOW_DOWNLOAD_SPEED") {
            config.acquisition.download_speed = speed;
        }

        config
    }
}
