//! MCP Server Entry Point
//!
//! Loads configuration from flags and environment variables, loads the tool
//! mapping table, and starts the selected transports.
//!
//! Environment Variables (each also available as a flag, see `--help`):
//! - SERVICE_URL: Base URL of the backend microservice (default: "http://localhost:8080")
//! - SERVICE_TIMEOUT: Per-request timeout in seconds (default: 30)
//! - MCP_TRANSPORT_MODE: "stdio", "http", or "both" (default: "both")
//! - HOST / PORT: Bind address for HTTP mode (default: "0.0.0.0:3000")
//! - MAPPINGS_FILE: Explicit tool mapping file (YAML, JSON or properties)
//! - LOG_LEVEL / RUST_LOG: Log filter

mod core;
mod mapping;
mod tools;

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use crate::core::config::{Cli, Config, TransportMode};
use crate::core::server::{self, AppState};
use crate::mapping::MappingLoader;
use crate::tools::dispatcher::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::try_from(Cli::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    crate::core::logging::init(&config);
    for (key, value) in config.summary() {
        info!("  {}: {}", key, value);
    }

    let table = MappingLoader::from_config(&config).load(None);
    let dispatcher = Arc::new(Dispatcher::new(&config, table)?);
    info!("Serving {} tools", dispatcher.list_tools().len());
    let state = Arc::new(AppState::new(&config, dispatcher));

    match config.transport {
        TransportMode::Stdio => server::run_server_stdio(state).await?,
        TransportMode::Http => server::run_server_http(state, &config).await?,
        TransportMode::Both => {
            // STDIO in the background, HTTP in the foreground
            let stdio_state = state.clone();
            let stdio_handle = tokio::spawn(async move {
                if let Err(e) = server::run_server_stdio(stdio_state).await {
                    error!("STDIO server error: {}", e);
                }
            });

            let http_result = server::run_server_http(state, &config).await;
            stdio_handle.abort();
            http_result?;
        }
    }

    info!("Server stopped");
    Ok(())
}
