//! Error types for the bridge.
//!
//! Only [`ConfigError`] may end the process. Every other kind is turned into
//! log lines or tool-call text before it reaches the MCP client.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid or missing configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid service URL '{url}': {reason}")]
    ServiceUrl { url: String, reason: String },

    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("server name must not be empty")]
    EmptyServerName,

    #[error("port must be non-zero when the HTTP transport is enabled")]
    ZeroPort,

    #[error("worker count must be greater than zero")]
    ZeroWorkers,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// A mappings source could not be turned into a mapping table.
///
/// Always recovered by the loader, which falls back to the built-in table.
#[derive(Debug, Error)]
pub enum MappingLoadError {
    #[error("mappings file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("mapping '{tool}': {reason}")]
    Schema { tool: String, reason: String },

    #[error("unsupported mappings file format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("no mappings defined in {0}")]
    Empty(PathBuf),
}

/// The caller's arguments do not satisfy a mapping's contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required parameters: {}", .0.join(", "))]
    MissingRequiredParameter(Vec<String>),
}

/// The backend call did not produce a usable JSON body.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("response body is not valid JSON: {0}")]
    InvalidBody(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Classify a reqwest failure. `timeout_secs` is only used in the message.
    pub fn from_reqwest(err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(timeout_secs)
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            TransportError::Request(err.to_string())
        }
    }

    /// Status code reported to the caller. 500 when no response was received.
    pub fn status_code(&self) -> u16 {
        match self {
            TransportError::Status { status, .. } => *status,
            _ => 500,
        }
    }
}

/// A single response element could not become a `ServiceRecord`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("no usable id in fields id, item_id or _id")]
    MissingId,
}

/// Failures inside the dispatch boundary that are not transport errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("arguments must be a JSON object, found {0}")]
    InvalidArguments(&'static str),

    #[error("{0}")]
    Passthrough(String),

    #[error("internal error: {0}")]
    Panicked(String),
}

/// Short name of a JSON value's type, used in error messages.
pub fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parameters_message_lists_every_name() {
        let err = ValidationError::MissingRequiredParameter(vec![
            "query".to_string(),
            "category".to_string(),
        ]);
        assert_eq!(err.to_string(), "Missing required parameters: query, category");
    }

    #[test]
    fn transport_status_code_defaults_to_500() {
        assert_eq!(TransportError::Timeout(30).status_code(), 500);
        assert_eq!(TransportError::Connect("refused".into()).status_code(), 500);
        let status = TransportError::Status {
            status: 404,
            message: "Not Found".into(),
        };
        assert_eq!(status.status_code(), 404);
    }
}
