//! Beacon - Entry point
//!
//! Serves the health, time and static endpoints until SIGINT or SIGTERM.

use anyhow::Context;
use tracing::info;

use beacon::prelude::*;

fn print_help() {
    println!(
        r"Beacon - minimal HTTP service

USAGE:
    beacon [OPTIONS]

OPTIONS:
    -h, --help       Print help information
    -v, --version    Print version information

ENVIRONMENT VARIABLES:
    PORT        Listen port (default: 8080)
    RUST_LOG    Log filter directive (default: info)

A .env file in the working directory is loaded first when present.
"
    );
}

/// Handles `--help` and `--version`. Returns `false` when the process should
/// exit without serving.
fn parse_args() -> anyhow::Result<bool> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--help" | "-h" => print_help(),
            "--version" | "-v" => println!("beacon {}", beacon::VERSION),
            other => anyhow::bail!("unknown argument: {other} (use --help for usage)"),
        }
        return Ok(false);
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if !parse_args()? {
        return Ok(());
    }

    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    init_logging(&LogConfig::production()).context("failed to initialize logging")?;

    let config = ServerConfig::from_env().context("invalid configuration")?;
    let port = config.port().unwrap_or_default();

    let handle = Server::new(config.clone(), app(&config)).start();
    info!("Server running on http://localhost:{port}");

    let report = lifecycle::run(handle, wait_for_termination()).await;
    info!(trigger = ?report.trigger, "Server stopped");

    Ok(())
}
