//! Request Builder: turns a mapping plus caller arguments into a concrete
//! backend request. Pure; performs no I/O.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Map, Value};

use crate::core::error::{DispatchError, ValidationError};
use crate::mapping::{HttpMethod, RequestMapping};

/// Characters escaped when a value is substituted into a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A backend request ready to be executed against a base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    /// Endpoint with placeholders substituted, e.g. `/api/items/7`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Map<String, Value>>,
    pub headers: Vec<(String, String)>,
}

impl PreparedRequest {
    /// Join `path` onto `base_url` and append the query string.
    pub fn url(&self, base_url: &str) -> Result<reqwest::Url, DispatchError> {
        let raw = format!("{}{}", base_url.trim_end_matches('/'), self.path);
        let mut url = reqwest::Url::parse(&raw).map_err(|e| DispatchError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }
}

/// Build the request for `mapping` from `arguments`.
///
/// An argument that is absent or `null` counts as missing. Every missing
/// required parameter is reported, in declared order.
///
/// Placement: present parameters are substituted into matching `{name}`
/// placeholders. For GET, optional parameters go to the query string, and so
/// do required parameters that have no placeholder. For other methods every
/// present parameter goes into the JSON body.
pub fn build(
    mapping: &RequestMapping,
    arguments: &Map<String, Value>,
) -> Result<PreparedRequest, ValidationError> {
    let missing: Vec<String> = mapping
        .required_params
        .iter()
        .filter(|param| lookup(arguments, param).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingRequiredParameter(missing));
    }

    let mut path = mapping.endpoint.clone();
    for param in mapping.all_params() {
        if let Some(value) = lookup(arguments, param) {
            let placeholder = format!("{{{}}}", param);
            if path.contains(&placeholder) {
                let encoded = utf8_percent_encode(&render_path_value(value), PATH_SEGMENT).to_string();
                path = path.replace(&placeholder, &encoded);
            }
        }
    }

    let mut query = Vec::new();
    let mut body = Map::new();

    if mapping.method == HttpMethod::Get {
        for param in &mapping.required_params {
            if mapping.is_path_param(param) {
                continue;
            }
            if let Some(value) = lookup(arguments, param) {
                push_query(&mut query, param, value);
            }
        }
        for param in &mapping.optional_params {
            if let Some(value) = lookup(arguments, param) {
                push_query(&mut query, param, value);
            }
        }
    } else {
        for param in mapping.all_params() {
            if let Some(value) = arguments.get(param.as_str()) {
                body.insert(param.clone(), value.clone());
            }
        }
    }

    Ok(PreparedRequest {
        method: mapping.method,
        path,
        query,
        body: if body.is_empty() { None } else { Some(body) },
        headers: Vec::new(),
    })
}

fn lookup<'a>(arguments: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    arguments.get(name).filter(|value| !value.is_null())
}

/// Scalars as plain text; arrays comma-joined; objects as compact JSON.
fn render_path_value(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(render_scalar)
            .collect::<Vec<_>>()
            .join(","),
        other => render_scalar(other),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Arrays become repeated `name=value` pairs; nulls are skipped.
fn push_query(query: &mut Vec<(String, String)>, name: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items.iter().filter(|item| !item.is_null()) {
                query.push((name.to_string(), render_scalar(item)));
            }
        }
        other => query.push((name.to_string(), render_scalar(other))),
    }
}
