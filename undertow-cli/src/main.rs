//! Undertow - stream a torrent to a media player while it downloads

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::error::ErrorKind;
use undertow_cli::{Cli, ExitStatus, Orchestrator};
use undertow_core::config::UndertowConfig;
use undertow_core::player::SystemSpawner;
use undertow_core::shutdown::listen_for_signals;
use undertow_core::tracing_setup::init_tracing;
use undertow_sim::SimulatedEngineFactory;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let status = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitStatus::Success,
                _ => ExitStatus::InvalidArguments,
            };
            // Printing help can only fail if stdout is gone.
            let _ = e.print();
            return status.into();
        }
    };

    if let Err(e) = init_tracing(cli.log_level.as_tracing_level(), cli.log_file.as_deref()) {
        eprintln!("Warning: logging unavailable: {e}");
    }

    let config = UndertowConfig::from_env();
    let orchestrator = Orchestrator::new(
        Arc::new(SimulatedEngineFactory::new(config.acquisition)),
        Arc::new(SystemSpawner),
    )
    .with_timing(config.timing);

    // Signal handlers are installed only once the engine and listener are up,
    // so Ctrl-C during startup keeps its default behaviour.
    let mut stdout = io::stdout();
    let status = orchestrator
        .run(cli.startup_options(), listen_for_signals, &mut stdout)
        .await;

    if status == ExitStatus::NoResourceProvided {
        eprintln!("{}", Cli::usage());
    }

    status.into()
}
