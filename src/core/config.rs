//! Process configuration.
//!
//! Every setting can come from a command-line flag or from the environment
//! variable named next to it. `Config` is built once in `main` and handed to
//! each component; nothing else reads the environment.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::core::error::ConfigError;

/// Deployment environment tag. Only affects defaults and log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Development,
    Production,
    Test,
    Docker,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
            Environment::Docker => "docker",
        };
        f.write_str(name)
    }
}

/// Which MCP transports to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportMode {
    /// Line-delimited JSON-RPC on stdin/stdout (MCP Inspector, local agents)
    Stdio,
    /// JSON-RPC over HTTP POST
    Http,
    /// Both of the above concurrently
    Both,
}

impl TransportMode {
    pub fn serves_http(self) -> bool {
        matches!(self, TransportMode::Http | TransportMode::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Command-line interface. Converted into [`Config`] with `Config::try_from`.
#[derive(Debug, Parser)]
#[command(name = "service-mcp-bridge", version, about = "MCP server exposing a backend microservice as tools")]
pub struct Cli {
    /// Base URL of the backend microservice
    #[arg(long, env = "SERVICE_URL", default_value = "http://localhost:8080")]
    pub service_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "SERVICE_TIMEOUT", default_value_t = 30)]
    pub timeout: u64,

    /// Server name reported in MCP initialize responses
    #[arg(long, env = "SERVER_NAME", default_value = "service-mcp-bridge")]
    pub server_name: String,

    /// Server version reported in MCP initialize responses
    #[arg(long, env = "SERVER_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub server_version: String,

    #[arg(long, env = "ENVIRONMENT", value_enum, default_value_t = Environment::Development)]
    pub environment: Environment,

    #[arg(long, env = "MCP_TRANSPORT_MODE", value_enum, default_value_t = TransportMode::Both)]
    pub transport: TransportMode,

    /// Bind address for the HTTP transport
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP transport
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// HTTP worker threads (defaults to CPU count, capped at 16)
    #[arg(long, env = "WORKER_THREADS")]
    pub workers: Option<usize>,

    /// Explicit tool mappings file (.yaml, .yml, .json or .properties)
    #[arg(long, env = "MAPPINGS_FILE")]
    pub mappings_file: Option<PathBuf>,

    /// Directory searched for tool_mappings.* when no file is given
    #[arg(long, env = "MAPPINGS_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Log filter directive, e.g. "info" or "service_mcp_bridge=debug"
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Log every outbound request
    #[arg(long, env = "ENABLE_REQUEST_LOGGING", default_value_t = true, action = clap::ArgAction::Set)]
    pub log_requests: bool,

    /// Log the status of every backend response
    #[arg(long, env = "ENABLE_RESPONSE_LOGGING", default_value_t = true, action = clap::ArgAction::Set)]
    pub log_responses: bool,

    /// Expose the generic_api passthrough tool
    #[arg(long, env = "ENABLE_GENERIC_API", default_value_t = true, action = clap::ArgAction::Set)]
    pub generic_api: bool,

    /// Re-rank search results by query similarity
    #[arg(long, env = "SEMANTIC_SEARCH_ENABLED", default_value_t = false, action = clap::ArgAction::Set)]
    pub semantic_search: bool,

    /// Lifetime of cached query embeddings in seconds (0 disables the cache)
    #[arg(long, env = "SEMANTIC_CACHE_TTL", default_value_t = 3600)]
    pub semantic_cache_ttl: u64,
}

/// Immutable runtime configuration shared by every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub service_url: String,
    pub timeout: Duration,
    pub server_name: String,
    pub server_version: String,
    pub environment: Environment,
    pub transport: TransportMode,
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub mappings_file: Option<PathBuf>,
    pub config_dir: PathBuf,
    pub log_level: String,
    pub log_format: LogFormat,
    pub log_requests: bool,
    pub log_responses: bool,
    pub generic_api: bool,
    pub semantic_search: bool,
    pub semantic_cache_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(30),
            server_name: "service-mcp-bridge".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            transport: TransportMode::Both,
            host: "0.0.0.0".to_string(),
            port: 3000,
            workers: default_workers(),
            mappings_file: None,
            config_dir: PathBuf::from("config"),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            log_requests: true,
            log_responses: true,
            generic_api: true,
            semantic_search: false,
            semantic_cache_ttl: Duration::from_secs(3600),
        }
    }
}

impl TryFrom<Cli> for Config {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let log_level = cli.log_level.unwrap_or_else(|| match cli.environment {
            Environment::Development => "debug".to_string(),
            _ => "info".to_string(),
        });

        let config = Config {
            service_url: cli.service_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(cli.timeout),
            server_name: cli.server_name,
            server_version: cli.server_version,
            environment: cli.environment,
            transport: cli.transport,
            host: cli.host,
            port: cli.port,
            workers: cli.workers.unwrap_or_else(default_workers),
            mappings_file: cli.mappings_file,
            config_dir: cli.config_dir,
            log_level,
            log_format: cli.log_format,
            log_requests: cli.log_requests,
            log_responses: cli.log_responses,
            generic_api: cli.generic_api,
            semantic_search: cli.semantic_search,
            semantic_cache_ttl: Duration::from_secs(cli.semantic_cache_ttl),
        };
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.service_url).map_err(|e| ConfigError::ServiceUrl {
            url: self.service_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ServiceUrl {
                url: self.service_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.server_name.trim().is_empty() {
            return Err(ConfigError::EmptyServerName);
        }
        if self.transport.serves_http() && self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(())
    }

    /// Key/value view of the settings worth logging at startup.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        vec![
            ("environment", self.environment.to_string()),
            ("server_name", self.server_name.clone()),
            ("server_version", self.server_version.clone()),
            ("service_url", self.service_url.clone()),
            ("timeout_secs", self.timeout.as_secs().to_string()),
            ("transport", format!("{:?}", self.transport).to_lowercase()),
            ("generic_api", self.generic_api.to_string()),
            ("semantic_search", self.semantic_search.to_string()),
        ]
    }
}

fn default_workers() -> usize {
    num_cpus::get().clamp(1, 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["service-mcp-bridge"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&[
            "--service-url",
            "http://backend:9000/",
            "--timeout",
            "5",
            "--transport",
            "stdio",
            "--environment",
            "production",
        ]);
        let config = Config::try_from(cli).unwrap();
        assert_eq!(config.service_url, "http://backend:9000");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn development_defaults_to_debug_logging() {
        let cli = parse(&["--environment", "development"]);
        let config = Config::try_from(cli).unwrap();
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn boolean_toggles_accept_explicit_values() {
        let cli = parse(&["--log-requests", "false", "--semantic-search", "true"]);
        let config = Config::try_from(cli).unwrap();
        assert!(!config.log_requests);
        assert!(config.log_responses);
        assert!(config.semantic_search);
    }

    #[test]
    fn rejects_non_http_service_url() {
        let config = Config {
            service_url: "ftp://backend".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ServiceUrl { .. })));
    }

    #[test]
    fn rejects_unparseable_service_url() {
        let config = Config {
            service_url: "not a url".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ServiceUrl { .. })));
    }

    #[test]
    fn rejects_zero_timeout() {
        let config = Config {
            timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn zero_port_is_only_rejected_for_http() {
        let stdio = Config {
            port: 0,
            transport: TransportMode::Stdio,
            ..Config::default()
        };
        assert!(stdio.validate().is_ok());

        let http = Config {
            port: 0,
            transport: TransportMode::Http,
            ..Config::default()
        };
        assert!(matches!(http.validate(), Err(ConfigError::ZeroPort)));
    }
}
