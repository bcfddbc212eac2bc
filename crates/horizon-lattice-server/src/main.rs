//! The display server binary.
//!
//! ```text
//! horizon-server [--config <file.toml>] [--debug]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use horizon_lattice_server::port::PortTable;
use horizon_lattice_server::{AppServer, Collaborators, ServerConfig, ServerError, logging};

#[derive(Parser, Debug)]
#[command(
    name = "horizon-server",
    about = "Display server core for Horizon Lattice",
    version
)]
struct Cli {
    /// TOML file overriding the default configuration.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging, filtered by RUST_LOG.
    #[arg(short, long)]
    debug: bool,
}

fn run(cli: Cli) -> Result<(), ServerError> {
    let config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    logging::init(cli.debug || config.debug);

    let ports = PortTable::new(config.max_ports);
    let mut server = AppServer::new(config, ports, Collaborators::system())?;
    let state = server.run();
    tracing::info!(target: logging::targets::SERVER, ?state, "exiting");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // The subscriber may not be installed yet if the config failed.
            logging::init(false);
            tracing::error!(target: logging::targets::SERVER, error = %err, "server failed");
            ExitCode::FAILURE
        }
    }
}
