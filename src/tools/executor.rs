//! HTTP Executor: issues prepared requests against the backend and captures
//! the outcome. Never returns an error; failures are recorded in the
//! [`ExecutionResult`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::core::config::Config;
use crate::core::error::{ConfigError, TransportError};
use crate::tools::builder::PreparedRequest;

/// Longest slice of an error body quoted back to the caller.
const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Parsed JSON body of a 2xx response (`null` for an empty body)
    Data(Value),
    /// Human-readable failure description
    Error(String),
}

/// What came back from one backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub status_code: u16,
    pub outcome: ExecutionOutcome,
    /// When the call completed. Copied into record metadata so normalising
    /// the same result twice gives equal records.
    pub received_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn success(status_code: u16, data: Value) -> Self {
        Self {
            status_code,
            outcome: ExecutionOutcome::Data(data),
            received_at: Utc::now(),
        }
    }

    pub fn failure(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            outcome: ExecutionOutcome::Error(message.into()),
            received_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Data(_))
    }

    pub fn data(&self) -> Option<&Value> {
        match &self.outcome {
            ExecutionOutcome::Data(data) => Some(data),
            ExecutionOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ExecutionOutcome::Data(_) => None,
            ExecutionOutcome::Error(message) => Some(message),
        }
    }
}

/// Pooled HTTP client bound to the configured backend.
///
/// One instance lives for the whole process; dropping it closes the pool.
pub struct HttpExecutor {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    log_requests: bool,
    log_responses: bool,
}

impl HttpExecutor {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("{}/{}", config.server_name, config.server_version))
            .build()?;

        Ok(Self {
            client,
            base_url: config.service_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            log_requests: config.log_requests,
            log_responses: config.log_responses,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `request` and wait for the full response body.
    ///
    /// Transport errors, timeouts and non-2xx statuses become failed results.
    /// A 2xx body that is not JSON is also a failure.
    pub async fn execute(&self, request: &PreparedRequest) -> ExecutionResult {
        let url = match request.url(&self.base_url) {
            Ok(url) => url,
            Err(e) => {
                error!("Cannot build request URL for {}: {}", request.path, e);
                return ExecutionResult::failure(500, e.to_string());
            }
        };

        if self.log_requests {
            info!(method = %request.method, url = %url, "Sending backend request");
            if let Some(body) = &request.body {
                let body = Value::Object(body.clone());
                debug!(body = %body, "Request body");
            }
        }

        let mut builder = self.client.request(request.method.to_reqwest(), url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return self.transport_failure(request, &url, &e),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return self.transport_failure(request, &url, &e),
        };

        if self.log_responses {
            info!(method = %request.method, url = %url, status = status.as_u16(), "Backend response");
        }

        if !status.is_success() {
            let err = TransportError::Status {
                status: status.as_u16(),
                message: status_message(status, &url, &text),
            };
            warn!(method = %request.method, url = %url, "{}", err);
            return ExecutionResult::failure(err.status_code(), err.to_string());
        }

        if text.trim().is_empty() {
            return ExecutionResult::success(status.as_u16(), Value::Null);
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(data) => ExecutionResult::success(status.as_u16(), data),
            Err(e) => {
                let err = TransportError::InvalidBody(e.to_string());
                warn!(method = %request.method, url = %url, "{}", err);
                ExecutionResult::failure(status.as_u16(), err.to_string())
            }
        }
    }

    fn transport_failure(
        &self,
        request: &PreparedRequest,
        url: &reqwest::Url,
        err: &reqwest::Error,
    ) -> ExecutionResult {
        let err = TransportError::from_reqwest(err, self.timeout.as_secs());
        error!(method = %request.method, url = %url, "HTTP error: {}", err);
        ExecutionResult::failure(err.status_code(), err.to_string())
    }
}

impl Drop for HttpExecutor {
    fn drop(&mut self) {
        debug!("Closing HTTP client for {}", self.base_url);
    }
}

fn status_message(status: reqwest::StatusCode, url: &reqwest::Url, body: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("Unknown");
    let mut message = format!("{} {} for url '{}'", status.as_u16(), reason, url);
    let body = body.trim();
    if !body.is_empty() {
        let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
        message.push_str(": ");
        message.push_str(&preview);
        if body.chars().count() > ERROR_BODY_PREVIEW {
            message.push_str("...");
        }
    }
    message
}
