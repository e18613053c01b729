// Anubis companion server

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use anubis::core::store::ConfigStore;
use anubis::core::traits::{StaticToken, Upstream};
use anubis::server::logging::init_logging;
use anubis::server::{HttpUpstream, LocalServer, Settings};

/// Local companion server for the Anubis trials overlay
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Settings file (defaults to anubis.toml next to the executable)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the settings file
    #[arg(short, long)]
    port: Option<u16>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings_path = cli.config.unwrap_or_else(Settings::default_path);

    // Logging is not up yet; report settings errors on stderr
    let mut settings = match Settings::load(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    init_logging(&settings.logging, settings.log_file(&settings_path));
    info!(settings = %settings_path.display(), "Anubis starting...");

    let store = match ConfigStore::open(settings.storage_path(&settings_path)) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "[store] Failed to open config store");
            return ExitCode::FAILURE;
        }
    };

    let token = Arc::new(StaticToken(Some(settings.api.access_token.clone())));
    let upstream = Upstream::from_single(Arc::new(HttpUpstream::new(&settings.api, token)));

    let server = match LocalServer::bind(
        &settings.server.address(),
        store,
        upstream,
        settings.session_settings(),
    ) {
        Ok(server) => server,
        Err(e) => {
            error!(address = %settings.server.address(), error = %e, "[ws] Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    // The desktop shell reads the chosen port from this line
    match server.local_addr() {
        Ok(addr) => println!("ws://{}", addr),
        Err(e) => error!(error = %e, "[ws] No local address"),
    }

    server.run();
    ExitCode::SUCCESS
}
