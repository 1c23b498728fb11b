//! Tool Dispatcher: resolves a tool call against the mapping table, drives
//! build, execute and normalise, and renders the outcome as text.
//!
//! Stateless per call. Nothing raised while handling a call escapes
//! [`Dispatcher::dispatch`]; every failure becomes a text response.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use crate::core::config::Config;
use crate::core::error::{ConfigError, DispatchError, json_kind};
use crate::core::server::MCPTool;
use crate::mapping::{HttpMethod, MappingTable, PASSTHROUGH_TOOL, RequestMapping};
use crate::tools::builder::{self, PreparedRequest};
use crate::tools::executor::HttpExecutor;
use crate::tools::format;
use crate::tools::normalizer::{self, Normalized};
use crate::tools::semantic::SemanticSearch;

/// Text answer to one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    /// Reported to MCP clients as `isError`
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

pub struct Dispatcher {
    table: Arc<MappingTable>,
    executor: HttpExecutor,
    semantic: SemanticSearch,
    generic_api: bool,
}

impl Dispatcher {
    pub fn new(config: &Config, table: MappingTable) -> Result<Self, ConfigError> {
        let semantic = SemanticSearch::from_config(config);
        if semantic.is_enabled() {
            info!("Semantic re-ranking enabled for search results");
        }
        Ok(Self {
            table: Arc::new(table),
            executor: HttpExecutor::new(config)?,
            semantic,
            generic_api: config.generic_api,
        })
    }

    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    pub fn service_url(&self) -> &str {
        self.executor.base_url()
    }

    /// One entry per mapping, plus the passthrough tool when enabled.
    pub fn list_tools(&self) -> Vec<MCPTool> {
        let mut tools: Vec<MCPTool> = self
            .table
            .iter()
            .map(|(name, mapping)| MCPTool {
                name: name.clone(),
                description: mapping.description.clone(),
                input_schema: mapping.input_schema(),
            })
            .collect();
        if self.generic_api {
            tools.push(passthrough_tool());
        }
        tools
    }

    /// Handle one `tools/call`. Never fails; errors are rendered as text.
    pub async fn dispatch(&self, tool: &str, arguments: Value) -> ToolOutput {
        debug!("Dispatching tool '{}'", tool);
        let call = AssertUnwindSafe(self.dispatch_inner(tool, arguments))
            .catch_unwind()
            .await;

        let err = match call {
            Ok(Ok(output)) => return output,
            Ok(Err(e)) => e,
            Err(panic) => DispatchError::Panicked(panic_message(panic.as_ref())),
        };
        error!("Error handling tool call {}: {}", tool, err);
        ToolOutput::error(format!("Error executing tool '{}': {}", tool, err))
    }

    async fn dispatch_inner(&self, tool: &str, arguments: Value) -> Result<ToolOutput, DispatchError> {
        if tool == PASSTHROUGH_TOOL {
            return self.dispatch_passthrough(arguments).await;
        }

        let Some(mapping) = self.table.get(tool) else {
            warn!("Unknown tool requested: {}", tool);
            return Ok(ToolOutput::error(format!("Unknown tool: {}", tool)));
        };

        let arguments = into_object(arguments)?;
        let request = match builder::build(mapping, &arguments) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejected call to {}: {}", tool, e);
                return Ok(ToolOutput::error(e.to_string()));
            }
        };

        let result = self.executor.execute(&request).await;
        if !result.is_success() {
            return Ok(ToolOutput::error(format::raw_response(&result)));
        }

        let Some(parser) = mapping.response_parser else {
            return Ok(ToolOutput::ok(format::raw_response(&result)));
        };

        let normalized = match normalizer::normalize(&result, Some(parser)) {
            Normalized::Records(records) => {
                let records = match arguments.get("query").and_then(Value::as_str) {
                    Some(query) => self.semantic.rerank(query, records),
                    None => records,
                };
                Normalized::Records(records)
            }
            passthrough => passthrough,
        };
        if normalized.is_empty() {
            debug!("Tool '{}' ({}) produced no records", tool, parser.name());
        }
        Ok(ToolOutput::ok(format::normalized(&normalized)))
    }

    async fn dispatch_passthrough(&self, arguments: Value) -> Result<ToolOutput, DispatchError> {
        if !self.generic_api {
            return Ok(ToolOutput::error("Generic API is disabled"));
        }
        let request = match passthrough_request(arguments) {
            Ok(request) => request,
            Err(DispatchError::Passthrough(message)) => return Ok(ToolOutput::error(message)),
            Err(e) => return Err(e),
        };

        let result = self.executor.execute(&request).await;
        let text = format::raw_response(&result);
        Ok(if result.is_success() {
            ToolOutput::ok(text)
        } else {
            ToolOutput::error(text)
        })
    }
}

/// Build the request for a `generic_api` call.
///
/// `path` becomes `/api/<path>`; `method` defaults to POST; entries of the
/// `params` and `body` objects join the argument set; `headers` are sent as
/// request headers. Every remaining key is an optional parameter.
pub fn passthrough_request(arguments: Value) -> Result<PreparedRequest, DispatchError> {
    let mut arguments = into_object(arguments)?;

    let path = match arguments.remove("path") {
        Some(Value::String(path)) if !path.trim().trim_start_matches('/').is_empty() => path,
        _ => return Err(DispatchError::Passthrough("Error: path is required".to_string())),
    };

    let method = match arguments.remove("method") {
        None | Some(Value::Null) => HttpMethod::Post,
        Some(Value::String(method)) => method
            .parse::<HttpMethod>()
            .map_err(|e| DispatchError::Passthrough(format!("Error: {}", e)))?,
        Some(other) => {
            return Err(DispatchError::Passthrough(format!(
                "Error: method must be a string, found {}",
                json_kind(&other)
            )));
        }
    };

    let headers = match arguments.remove("headers") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(headers)) => headers
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, value)
            })
            .collect(),
        Some(other) => {
            return Err(DispatchError::Passthrough(format!(
                "Error: headers must be an object, found {}",
                json_kind(&other)
            )));
        }
    };

    for section in ["params", "body"] {
        match arguments.remove(section) {
            None | Some(Value::Null) => {}
            Some(Value::Object(entries)) => {
                for (key, value) in entries {
                    arguments.entry(key).or_insert(value);
                }
            }
            Some(other) => {
                return Err(DispatchError::Passthrough(format!(
                    "Error: {} must be an object, found {}",
                    section,
                    json_kind(&other)
                )));
            }
        }
    }

    let mut mapping = RequestMapping::new(
        format!("/api/{}", path.trim().trim_start_matches('/')),
        method,
        "Generic API request",
    );
    mapping.optional_params = arguments.keys().cloned().collect();

    let mut request = builder::build(&mapping, &arguments)
        .map_err(|e| DispatchError::Passthrough(e.to_string()))?;
    request.headers = headers;
    Ok(request)
}

/// Schema of the passthrough tool.
pub fn passthrough_tool() -> MCPTool {
    MCPTool {
        name: PASSTHROUGH_TOOL.to_string(),
        description: "Generic API request passthrough to the microservice. Supports any HTTP method and endpoint.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "API endpoint path (e.g., 'items/search', 'categories')"
                },
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST", "PUT", "DELETE"],
                    "description": "HTTP method to use",
                    "default": "POST"
                },
                "body": {
                    "type": "object",
                    "description": "Request body data (for POST/PUT requests)"
                },
                "params": {
                    "type": "object",
                    "description": "Query parameters (for GET requests)"
                },
                "headers": {
                    "type": "object",
                    "description": "Additional HTTP headers"
                }
            },
            "required": ["path"]
        }),
    }
}

/// Tool arguments as a map. `null` is treated as no arguments.
fn into_object(arguments: Value) -> Result<Map<String, Value>, DispatchError> {
    match arguments {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(DispatchError::InvalidArguments(json_kind(&other))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{MockBackend, MockRoute};
    use std::time::Duration;

    fn dispatcher_for(base_url: &str) -> Dispatcher {
        let config = Config {
            service_url: base_url.to_string(),
            timeout: Duration::from_secs(5),
            ..Config::default()
        };
        Dispatcher::new(&config, MappingTable::defaults()).unwrap()
    }

    #[actix_rt::test]
    async fn get_item_renders_the_record() {
        let backend = MockBackend::start(vec![MockRoute::json(
            "/api/items/7",
            200,
            r#"{"id":"7","name":"Widget"}"#,
        )])
        .await;
        let dispatcher = dispatcher_for(&backend.base_url);

        let output = dispatcher.dispatch("get_item", json!({"id": "7"})).await;
        assert!(!output.is_error);
        assert!(output.text.contains("ID: 7"), "{}", output.text);
        assert!(output.text.contains("name: Widget"), "{}", output.text);
        backend.stop().await;
    }

    #[actix_rt::test]
    async fn missing_required_param_makes_no_http_call() {
        let backend = MockBackend::start(Vec::new()).await;
        let dispatcher = dispatcher_for(&backend.base_url);

        let output = dispatcher.dispatch("search_items", json!({})).await;
        assert_eq!(output.text, "Missing required parameters: query");
        assert!(output.is_error);
        assert!(backend.requests().is_empty());
        backend.stop().await;
    }

    #[actix_rt::test]
    async fn unknown_tool_is_plain_text() {
        let dispatcher = dispatcher_for("http://127.0.0.1:9");
        let output = dispatcher.dispatch("unknown_tool", json!({"x": 1})).await;
        assert_eq!(output.text, "Unknown tool: unknown_tool");
        assert!(output.is_error);
    }

    #[actix_rt::test]
    async fn backend_error_is_reported_as_text() {
        let backend = MockBackend::start(vec![MockRoute::json("/api/items/1", 500, "{}")]).await;
        let dispatcher = dispatcher_for(&backend.base_url);

        let output = dispatcher.dispatch("get_item", json!({"id": "1"})).await;
        assert!(output.is_error);
        assert!(output.text.contains("API Error"), "{}", output.text);
        assert!(output.text.contains("500"), "{}", output.text);
        backend.stop().await;
    }

    #[actix_rt::test]
    async fn passthrough_issues_the_raw_request() {
        let backend = MockBackend::start(vec![MockRoute::json(
            "/api/categories",
            200,
            r#"{"categories":["tools"]}"#,
        )])
        .await;
        let dispatcher = dispatcher_for(&backend.base_url);

        let output = dispatcher
            .dispatch(PASSTHROUGH_TOOL, json!({"path": "categories", "method": "GET"}))
            .await;
        assert!(!output.is_error);
        assert!(output.text.starts_with("API Response (Status: 200):"));

        let recorded = backend.requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].method, "GET");
        assert_eq!(recorded[0].path, "/api/categories");
        assert_eq!(recorded[0].query, "");
        backend.stop().await;
    }

    #[actix_rt::test]
    async fn categories_are_listed() {
        let backend = MockBackend::start(vec![MockRoute::json(
            "/api/categories",
            200,
            r#"{"categories":[{"name":"tools"},{"name":"garden"}]}"#,
        )])
        .await;
        let dispatcher = dispatcher_for(&backend.base_url);

        let output = dispatcher.dispatch("get_categories", json!({})).await;
        assert_eq!(output.text, "Found 2 categories:\n- tools\n- garden\n");
        backend.stop().await;
    }

    #[actix_rt::test]
    async fn empty_result_says_no_data() {
        let backend = MockBackend::start(vec![MockRoute::json(
            "/api/items/category/none",
            200,
            r#"{"items":[]}"#,
        )])
        .await;
        let dispatcher = dispatcher_for(&backend.base_url);

        let output = dispatcher
            .dispatch("get_items_by_category", json!({"category": "none", "limit": 3}))
            .await;
        assert_eq!(output.text, "No data found");
        assert_eq!(backend.requests()[0].query, "limit=3");
        backend.stop().await;
    }

    #[actix_rt::test]
    async fn search_posts_json_body() {
        let backend = MockBackend::start(vec![MockRoute::json(
            "/api/items/search",
            200,
            r#"{"items":[{"id":"1","name":"lamp"},{"id":"2","name":"desk"}]}"#,
        )])
        .await;
        let dispatcher = dispatcher_for(&backend.base_url);

        let output = dispatcher
            .dispatch("search_items", json!({"query": "lamp", "top": 2}))
            .await;
        assert!(output.text.starts_with("Found 2 item(s):"), "{}", output.text);

        let recorded = backend.requests();
        assert_eq!(recorded[0].method, "POST");
        assert_eq!(recorded[0].json_body(), Some(json!({"query": "lamp", "top": 2})));
        backend.stop().await;
    }

    #[actix_rt::test]
    async fn non_object_arguments_are_rejected() {
        let dispatcher = dispatcher_for("http://127.0.0.1:9");
        let output = dispatcher.dispatch("get_item", json!(["7"])).await;
        assert!(output.is_error);
        assert_eq!(
            output.text,
            "Error executing tool 'get_item': arguments must be a JSON object, found array"
        );
    }

    #[actix_rt::test]
    async fn disabled_passthrough_is_hidden_and_refused() {
        let config = Config {
            service_url: "http://127.0.0.1:9".to_string(),
            generic_api: false,
            ..Config::default()
        };
        let dispatcher = Dispatcher::new(&config, MappingTable::defaults()).unwrap();
        assert!(dispatcher.list_tools().iter().all(|t| t.name != PASSTHROUGH_TOOL));

        let output = dispatcher.dispatch(PASSTHROUGH_TOOL, json!({"path": "x"})).await;
        assert_eq!(output.text, "Generic API is disabled");
    }

    #[test]
    fn list_tools_covers_table_and_passthrough() {
        let dispatcher = dispatcher_for("http://localhost:8080");
        let tools = dispatcher.list_tools();
        assert_eq!(tools.len(), dispatcher.table().len() + 1);

        let passthrough = tools.iter().find(|t| t.name == PASSTHROUGH_TOOL).unwrap();
        assert_eq!(passthrough.input_schema["required"], json!(["path"]));
        for optional in ["method", "body", "params", "headers"] {
            assert!(passthrough.input_schema["properties"].get(optional).is_some());
        }
    }

    #[test]
    fn passthrough_requires_a_path() {
        let err = passthrough_request(json!({"method": "GET"})).unwrap_err();
        assert_eq!(err.to_string(), "Error: path is required");
        let err = passthrough_request(json!({"path": "/"})).unwrap_err();
        assert_eq!(err.to_string(), "Error: path is required");
    }

    #[test]
    fn passthrough_defaults_to_post_with_body() {
        let request = passthrough_request(json!({
            "path": "/items/search",
            "body": {"query": "lamp"},
            "headers": {"x-trace": "abc"}
        }))
        .unwrap();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.path, "/api/items/search");
        assert_eq!(
            request.body.map(Value::Object),
            Some(json!({"query": "lamp"}))
        );
        assert_eq!(request.headers, vec![("x-trace".to_string(), "abc".to_string())]);
    }

    #[test]
    fn passthrough_get_sends_params_as_query() {
        let request = passthrough_request(json!({
            "path": "items",
            "method": "get",
            "params": {"limit": 5}
        }))
        .unwrap();
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.query, vec![("limit".to_string(), "5".to_string())]);
        assert!(request.body.is_none());
    }

    #[test]
    fn passthrough_rejects_unknown_method() {
        let err = passthrough_request(json!({"path": "items", "method": "PATCH"})).unwrap_err();
        assert_eq!(err.to_string(), "Error: unsupported HTTP method 'PATCH'");
    }
}
