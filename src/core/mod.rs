//! Core Server Framework Module
//!
//! This module contains the protocol-facing plumbing:
//! - config.rs: CLI/environment configuration
//! - error.rs: error taxonomy shared by every layer
//! - logging.rs: tracing subscriber setup
//! - server.rs: MCP server implementation with HTTP and STDIO transport

pub mod config;
pub mod error;
pub mod logging;
pub mod server;
