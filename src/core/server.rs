//! MCP Server Implementation
//!
//! This module contains the protocol adapter in front of the tool dispatcher:
//! - JSON-RPC 2.0 request/response structures
//! - A single request handler shared by both transports
//! - HTTP server setup with Actix Web
//! - STDIO server implementation for line-based communication

use actix_web::{
    web, App, HttpServer, HttpResponse, Result,
    middleware::{Compress, Logger, DefaultHeaders},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

use crate::core::config::{Config, Environment};
use crate::tools::dispatcher::Dispatcher;

/// MCP protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

/// Request counters exposed on `/metrics`.
///
/// Relaxed ordering is enough; the counters are only ever read as a snapshot.
#[derive(Default, Debug)]
pub struct Metrics {
    pub requests: AtomicU64,
    pub tool_calls: AtomicU64,
    pub tool_errors: AtomicU64,
}

impl Metrics {
    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "requests_total": self.requests.load(Ordering::Relaxed),
            "tool_calls_total": self.tool_calls.load(Ordering::Relaxed),
            "tool_errors_total": self.tool_errors.load(Ordering::Relaxed),
            "status": "ok"
        })
    }
}

/// Application state shared by every HTTP worker and the STDIO loop.
pub struct AppState {
    /// Server name as reported in MCP initialize responses
    pub server_name: String,
    /// Server version string as reported in MCP initialize responses
    pub server_version: String,
    pub environment: Environment,
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            server_name: config.server_name.clone(),
            server_version: config.server_version.clone(),
            environment: config.environment,
            dispatcher,
            metrics: Metrics::default(),
        }
    }
}

/// JSON-RPC 2.0 request structure for MCP protocol.
///
/// All MCP requests follow the JSON-RPC 2.0 specification. The jsonrpc field
/// must be "2.0", id is optional (None for notifications), method specifies
/// the MCP method to call, and params contains method-specific parameters.
#[derive(Deserialize, Debug)]
pub struct MCPRequest {
    /// JSON-RPC version identifier, must be "2.0"
    #[allow(dead_code)]
    jsonrpc: String,
    /// Request ID for correlating responses. None indicates a notification.
    id: Option<serde_json::Value>,
    /// MCP method name (e.g., "initialize", "tools/list", "tools/call")
    method: String,
    /// Method-specific parameters as JSON value
    params: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response structure for MCP protocol.
///
/// Responses must include jsonrpc "2.0", the request id, and either a result
/// or an error. The error field is only present when an error occurred.
#[derive(Serialize, Debug)]
pub struct MCPResponse {
    /// JSON-RPC version identifier, always "2.0"
    jsonrpc: String,
    /// Request ID from the original request
    id: Option<serde_json::Value>,
    /// Response result, present when request succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    /// Error information, present when request failed
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<MCPError>,
}

impl MCPResponse {
    fn result(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(MCPError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC 2.0 error structure.
#[derive(Serialize, Debug)]
pub struct MCPError {
    /// JSON-RPC error code (e.g., -32601 for method not found)
    code: i32,
    /// Human-readable error message
    message: String,
    /// Optional additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

/// MCP tool definition structure.
///
/// Serialized as an entry of the `tools/list` result.
#[derive(Serialize, Debug, Clone)]
pub struct MCPTool {
    /// Unique tool identifier (e.g., "get_item", "generic_api")
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema defining the tool's input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// Route one JSON-RPC request. Notifications produce no response.
pub async fn handle_request(state: &AppState, req: MCPRequest) -> Option<MCPResponse> {
    state.metrics.requests.fetch_add(1, Ordering::Relaxed);

    let Some(id) = req.id else {
        debug!("Notification received: {}", req.method);
        return None;
    };
    let id = Some(id);

    let response = match req.method.as_str() {
        "initialize" => handle_initialize(state, id),
        "ping" => MCPResponse::result(id, serde_json::json!({})),
        "tools/list" => handle_tools_list(state, id),
        "tools/call" => handle_tools_call(state, id, req.params).await,
        other => {
            warn!("Method not found: {}", other);
            MCPResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", other))
        }
    };
    Some(response)
}

/// Handle MCP initialize method.
fn handle_initialize(state: &AppState, id: Option<serde_json::Value>) -> MCPResponse {
    MCPResponse::result(
        id,
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": state.server_name,
                "version": state.server_version
            }
        }),
    )
}

/// Handle MCP tools/list method.
fn handle_tools_list(state: &AppState, id: Option<serde_json::Value>) -> MCPResponse {
    MCPResponse::result(
        id,
        serde_json::json!({
            "tools": state.dispatcher.list_tools()
        }),
    )
}

/// Handle MCP tools/call method.
///
/// Tool-level failures (unknown tool, missing parameters, backend errors) are
/// reported inside the result with `isError: true`; only a malformed call is a
/// JSON-RPC error.
async fn handle_tools_call(
    state: &AppState,
    id: Option<serde_json::Value>,
    params: Option<serde_json::Value>,
) -> MCPResponse {
    let Some(params) = params else {
        return MCPResponse::error(id, INVALID_PARAMS, "Invalid params");
    };
    let Some(tool_name) = params.get("name").and_then(|v| v.as_str()) else {
        return MCPResponse::error(id, INVALID_PARAMS, "Invalid params: missing tool name");
    };
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    state.metrics.tool_calls.fetch_add(1, Ordering::Relaxed);
    let output = state.dispatcher.dispatch(tool_name, arguments).await;
    if output.is_error {
        state.metrics.tool_errors.fetch_add(1, Ordering::Relaxed);
    }

    MCPResponse::result(
        id,
        serde_json::json!({
            "content": [
                {
                    "type": "text",
                    "text": output.text
                }
            ],
            "isError": output.is_error
        }),
    )
}

/// Response for a frame that is not a valid request.
///
/// `None` when no id can be recovered; such frames get no reply on STDIO.
fn parse_error_response(frame: &[u8], err: &serde_json::Error) -> Option<MCPResponse> {
    let partial = serde_json::from_slice::<serde_json::Value>(frame).ok()?;
    let id = partial.get("id")?.clone();
    Some(MCPResponse::error(Some(id), PARSE_ERROR, format!("Parse error: {}", err)))
}

/// Health check endpoint handler.
async fn health(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": state.server_name,
        "version": state.server_version,
        "environment": state.environment.to_string(),
        "service_url": state.dispatcher.service_url(),
        "tools": state.dispatcher.list_tools().len(),
        "mappings": state.dispatcher.table().len()
    })))
}

/// MCP JSON-RPC request handler for HTTP mode.
///
/// Notifications are acknowledged with 202 and an empty body.
async fn mcp_handler(state: web::Data<AppState>, body: web::Bytes) -> Result<HttpResponse> {
    let req = match serde_json::from_slice::<MCPRequest>(&body) {
        Ok(req) => req,
        Err(e) => {
            warn!("Parse error: {}", e);
            let response = parse_error_response(&body, &e)
                .unwrap_or_else(|| MCPResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e)));
            return Ok(HttpResponse::BadRequest().json(response));
        }
    };

    Ok(match handle_request(&state, req).await {
        Some(response) => HttpResponse::Ok().json(response),
        None => HttpResponse::Accepted().finish(),
    })
}

/// Metrics endpoint handler for monitoring.
async fn metrics_handler(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.metrics.snapshot()))
}

/// Server-Sent Events endpoint for tools discovery.
///
/// Emits the current tool list as a single SSE event.
async fn sse_tools_discovery(state: web::Data<AppState>) -> Result<HttpResponse> {
    use actix_web::http::header;

    let tools = state.dispatcher.list_tools();
    let tools_data = serde_json::json!({
        "count": tools.len(),
        "tools": tools
    });

    // Format as SSE event: "data: {json}\n\n"
    let sse_data = format!(
        "data: {}\n\n",
        serde_json::to_string(&tools_data).unwrap_or_else(|_| "{}".to_string())
    );

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(header::CacheControl(vec![
            header::CacheDirective::NoCache,
            header::CacheDirective::NoStore,
            header::CacheDirective::MustRevalidate,
        ]))
        // Disable nginx buffering for real-time streaming
        .insert_header(("x-accel-buffering", "no"))
        .body(sse_data))
}

/// Register every HTTP route.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/sse", web::get().to(sse_tools_discovery))
        .route("/mcp", web::post().to(mcp_handler))
        .route("/", web::post().to(mcp_handler))
        .route("/", web::get().to(health));
}

/// Run the MCP server in HTTP mode.
///
/// # Configuration
/// - Worker threads: `Config::workers` (CPU count capped at 16 by default)
/// - Max connections: 10,000 concurrent connections
/// - Connection rate limit: 1,000 connections per second
/// - Keep-alive: 30 seconds
/// - Request timeout: 30 seconds
/// - Shutdown timeout: 10 seconds
pub async fn run_server_http(state: Arc<AppState>, config: &Config) -> std::io::Result<()> {
    use std::time::Duration;

    let bind_addr = format!("{}:{}", config.host, config.port);
    let app_state = web::Data::from(state);

    info!(
        bind = %bind_addr,
        workers = config.workers,
        "MCP server starting (HTTP mode)"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            // Enable compression for JSON responses (gzip/brotli)
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block"))
            )
            // %r = request line, %s = status, %Dms = duration in milliseconds
            .wrap(Logger::new("%r %s %Dms"))
            .configure(routes)
    })
    .workers(config.workers)
    .max_connections(10000)
    .max_connection_rate(1000)
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(2))
    .shutdown_timeout(10)
    .bind(&bind_addr)?
    .run()
    .await
}

/// Run the MCP server in STDIO mode.
///
/// Reads JSON-RPC requests line-by-line from stdin and writes responses to
/// stdout. Requests are processed one at a time; nothing but protocol frames
/// is ever written to stdout.
pub async fn run_server_stdio(state: Arc<AppState>) -> std::io::Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader, BufWriter};

    info!("MCP server starting (STDIO mode)");

    let stdin = tokio::io::stdin();
    let mut stdin = BufReader::with_capacity(8192, stdin).lines();
    let stdout = tokio::io::stdout();
    let mut stdout = BufWriter::with_capacity(8192, stdout);

    while let Some(line) = stdin.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<MCPRequest>(&line) {
            Ok(req) => handle_request(&state, req).await,
            Err(e) => {
                warn!("Parse error: {}", e);
                parse_error_response(line.as_bytes(), &e)
            }
        };

        if let Some(response) = response {
            if let Err(e) = write_frame(&mut stdout, &response).await {
                error!("Error writing to stdout: {}", e);
                break;
            }
        }
    }

    info!("STDIO input closed");
    Ok(())
}

/// Write one response as a single line and flush.
async fn write_frame<W>(out: &mut W, response: &MCPResponse) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;

    let json = serde_json::to_string(response)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    out.write_all(json.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}
