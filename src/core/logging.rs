//! Tracing setup.
//!
//! Logs always go to stderr: in STDIO mode stdout is reserved for JSON-RPC
//! frames.

use tracing_subscriber::EnvFilter;

use crate::core::config::{Config, LogFormat};

/// Install the global subscriber. `RUST_LOG` wins over `Config::log_level`.
///
/// Calling this twice is harmless; the second install attempt is ignored.
pub fn init(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let result = match config.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    if let Err(e) = result {
        eprintln!("logging already initialised: {}", e);
    }
}
