//! Tool mappings: the declarative contract binding a tool name to a backend
//! endpoint, method and parameter set.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde_json::{Value, json};

/// Reserved tool name for raw requests. Synthesized by the dispatcher and
/// never stored in a [`MappingTable`].
pub const PASSTHROUGH_TOOL: &str = "generic_api";

/// HTTP methods a mapping may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("unsupported HTTP method '{}'", other)),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy used to turn a backend response into records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseParser {
    /// `parse_item`: the body is a single object
    Item,
    /// `parse_categories`: `body.categories` is passed through untouched
    Categories,
    /// `parse_items_list`: `body.items` is an array of objects
    ItemsList,
    /// Anything else: guess from the body's shape
    Structural,
}

impl ResponseParser {
    /// Resolve a configured parser name. `None` for unknown names; the loader
    /// maps those to [`ResponseParser::Structural`] with a warning.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "parse_item" => Some(ResponseParser::Item),
            "parse_categories" => Some(ResponseParser::Categories),
            "parse_items_list" => Some(ResponseParser::ItemsList),
            "structural" | "default" => Some(ResponseParser::Structural),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseParser::Item => "parse_item",
            ResponseParser::Categories => "parse_categories",
            ResponseParser::ItemsList => "parse_items_list",
            ResponseParser::Structural => "structural",
        }
    }
}

/// JSON Schema type declared for a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Some(ParamType::String),
            "integer" | "int" => Some(ParamType::Integer),
            "number" | "float" => Some(ParamType::Number),
            "boolean" | "bool" => Some(ParamType::Boolean),
            "array" | "list" => Some(ParamType::Array),
            "object" | "dict" => Some(ParamType::Object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

/// A tool's contract with the backend.
///
/// `required_params` and `optional_params` are disjoint and keep their
/// declared order. Every `{name}` placeholder in `endpoint` should name one of
/// them; the loader warns when it does not.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMapping {
    pub endpoint: String,
    pub method: HttpMethod,
    pub description: String,
    pub required_params: Vec<String>,
    pub optional_params: Vec<String>,
    pub response_parser: Option<ResponseParser>,
    pub param_types: IndexMap<String, ParamType>,
}

impl RequestMapping {
    pub fn new(endpoint: impl Into<String>, method: HttpMethod, description: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            description: description.into(),
            required_params: Vec::new(),
            optional_params: Vec::new(),
            response_parser: None,
            param_types: IndexMap::new(),
        }
    }

    pub fn with_required(mut self, params: &[&str]) -> Self {
        self.required_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_optional(mut self, params: &[&str]) -> Self {
        self.optional_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_parser(mut self, parser: ResponseParser) -> Self {
        self.response_parser = Some(parser);
        self
    }

    pub fn with_param_type(mut self, name: &str, ty: ParamType) -> Self {
        self.param_types.insert(name.to_string(), ty);
        self
    }

    /// Names of the `{placeholder}` segments in the endpoint, in order.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.endpoint.as_str();
        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    if !name.is_empty() {
                        names.push(name);
                    }
                    rest = &after[end + 1..];
                }
                None => break,
            }
        }
        names
    }

    /// Whether `name` appears as `{name}` in the endpoint template.
    pub fn is_path_param(&self, name: &str) -> bool {
        self.endpoint.contains(&format!("{{{}}}", name))
    }

    /// Required params first, then optional, in declared order.
    pub fn all_params(&self) -> impl Iterator<Item = &String> {
        self.required_params.iter().chain(self.optional_params.iter())
    }

    pub fn param_type(&self, name: &str) -> ParamType {
        self.param_types.get(name).copied().unwrap_or_default()
    }

    /// JSON Schema advertised to MCP clients for this tool.
    pub fn input_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for param in &self.required_params {
            properties.insert(
                param.clone(),
                json!({
                    "type": self.param_type(param).as_str(),
                    "description": format!("Required parameter: {}", param)
                }),
            );
        }
        for param in &self.optional_params {
            properties.insert(
                param.clone(),
                json!({
                    "type": self.param_type(param).as_str(),
                    "description": format!("Optional parameter: {}", param)
                }),
            );
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required_params
        })
    }
}

/// Tool name to mapping. Built once at startup and only read afterwards, so
/// it can be shared behind an `Arc` without locking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingTable {
    mappings: IndexMap<String, RequestMapping>,
}

impl MappingTable {
    pub fn new(mappings: IndexMap<String, RequestMapping>) -> Self {
        Self { mappings }
    }

    /// The built-in table used whenever no mappings source can be loaded.
    pub fn defaults() -> Self {
        let mut mappings = IndexMap::new();
        mappings.insert(
            "get_item".to_string(),
            RequestMapping::new("/api/items/{id}", HttpMethod::Get, "Get a specific item by ID")
                .with_required(&["id"])
                .with_parser(ResponseParser::Item),
        );
        mappings.insert(
            "get_categories".to_string(),
            RequestMapping::new("/api/categories", HttpMethod::Get, "Get all available categories")
                .with_parser(ResponseParser::Categories),
        );
        mappings.insert(
            "get_items_by_category".to_string(),
            RequestMapping::new(
                "/api/items/category/{category}",
                HttpMethod::Get,
                "Get items by category",
            )
            .with_required(&["category"])
            .with_optional(&["limit"])
            .with_param_type("limit", ParamType::Integer)
            .with_parser(ResponseParser::ItemsList),
        );
        mappings.insert(
            "search_items".to_string(),
            RequestMapping::new("/api/items/search", HttpMethod::Post, "Search items with filters")
                .with_required(&["query"])
                .with_optional(&["filter", "top"])
                .with_param_type("filter", ParamType::Object)
                .with_param_type("top", ParamType::Integer)
                .with_parser(ResponseParser::ItemsList),
        );
        Self { mappings }
    }

    pub fn get(&self, tool: &str) -> Option<&RequestMapping> {
        self.mappings.get(tool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RequestMapping)> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
