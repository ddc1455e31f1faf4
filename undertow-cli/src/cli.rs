//! Command-line arguments

use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use undertow_core::config::{DEFAULT_PORT, Viewer};
use undertow_core::tracing_setup::CliLogLevel;

use crate::orchestrator::StartupOptions;

/// Stream a torrent over HTTP while it downloads
#[derive(Debug, Parser)]
#[command(name = "undertow")]
#[command(version, about = "Stream a torrent over HTTP while it downloads")]
pub struct Cli {
    /// Open the stream in VLC once enough data is buffered
    #[arg(long)]
    pub vlc: bool,

    /// Open the stream in mplayer once enough data is buffered
    #[arg(long)]
    pub mplayer: bool,

    /// Port the HTTP stream listens on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Keep seeding after the download completes
    #[arg(long)]
    pub seed: bool,

    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
    pub log_level: CliLogLevel,

    /// Also write trace-level logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Torrent or media file to stream
    pub resource: Option<String>,
}

impl Cli {
    /// Viewers enabled on the command line, VLC first.
    pub fn viewers(&self) -> Vec<Viewer> {
        let mut viewers = Vec::new();
        if self.vlc {
            viewers.push(Viewer::Vlc);
        }
        if self.mplayer {
            viewers.push(Viewer::Mplayer);
        }
        viewers
    }

    /// Startup options handed to the orchestrator.
    pub fn startup_options(&self) -> StartupOptions {
        StartupOptions {
            resource: self.resource.clone(),
            port: self.port,
            seed: self.seed,
            viewers: self.viewers(),
        }
    }

    /// Rendered usage text, printed when no resource is given.
    pub fn usage() -> String {
        Self::command().render_help().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["undertow", "movie.torrent"]).unwrap();

        assert_eq!(cli.port, 8080);
        assert!(!cli.seed);
        assert!(cli.viewers().is_empty());
        assert_eq!(cli.log_level, CliLogLevel::Info);
        assert_eq!(cli.resource.as_deref(), Some("movie.torrent"));
    }

    #[test]
    fn test_all_flags() {
        let cli = Cli::try_parse_from([
            "undertow",
            "--vlc",
            "--mplayer",
            "-p",
            "9000",
            "--seed",
            "--log-level",
            "debug",
            "movie.torrent",
        ])
        .unwrap();

        let options = cli.startup_options();
        assert_eq!(options.port, 9000);
        assert!(options.seed);
        assert_eq!(options.viewers, vec![Viewer::Vlc, Viewer::Mplayer]);
        assert_eq!(cli.log_level, CliLogLevel::Debug);
    }

    #[test]
    fn test_resource_is_optional_at_parse_time() {
        let cli = Cli::try_parse_from(["undertow", "--vlc"]).unwrap();
        assert!(cli.resource.is_none());
    }

    #[test]
    fn test_second_positional_rejected() {
        let result = Cli::try_parse_from(["undertow", "a.torrent", "b.torrent"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_port_rejected() {
        let result = Cli::try_parse_from(["undertow", "--port", "http", "a.torrent"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_usage_mentions_flags() {
        let usage = Cli::usage();
        assert!(usage.contains("--vlc"));
        assert!(usage.contains("--mplayer"));
        assert!(usage.contains("--port"));
        assert!(usage.contains("--seed"));
    }

    #[test]
    fn test_command_is_well_formed() {
        Cli::command().debug_assert();
    }
}
