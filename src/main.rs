//! Engine DAP - debug adapter for Lua scripts running inside a game engine
//!
//! Editors start this binary and speak DAP over stdin/stdout, or connect to
//! it over TCP when started with `--port`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use engine_dap::common::{config::Config, logging};
use engine_dap::dap::server;
use engine_dap::engine::WebSocketConnector;
use engine_dap::launcher::ToolchainLauncher;

#[derive(Parser)]
#[command(name = "engine-dap", about = "Debug adapter for engine Lua scripts")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Accept one DAP client on 127.0.0.1:PORT instead of using stdio
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let log_file = cli.log_file.clone().or_else(|| config.logging.file.clone());
    let _guard = logging::init(log_file.as_deref());

    let connector = Arc::new(WebSocketConnector);
    let launcher = Arc::new(ToolchainLauncher::new(
        config.engine.ip.clone(),
        config.engine.port,
    ));

    let result = match cli.port {
        Some(port) => server::serve_tcp(port, config, connector, launcher).await,
        None => server::serve_stdio(config, connector, launcher).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Adapter stopped");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
