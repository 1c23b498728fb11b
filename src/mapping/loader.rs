//! Loads the mapping table from a YAML, JSON or properties file.
//!
//! Loading never fails: any problem is logged and the built-in table from
//! [`MappingTable::defaults`] is used instead.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::core::config::Config;
use crate::core::error::MappingLoadError;
use crate::mapping::table::{
    HttpMethod, MappingTable, PASSTHROUGH_TOOL, ParamType, RequestMapping, ResponseParser,
};

/// File names searched in the config directory, in precedence order.
pub const MAPPING_FILE_CANDIDATES: [&str; 4] = [
    "tool_mappings.yaml",
    "tool_mappings.yml",
    "tool_mappings.json",
    "tool_mappings.properties",
];

/// Shared document shape of the YAML and JSON formats.
///
/// A `response_parsers` section is accepted for compatibility and ignored.
#[derive(Debug, Deserialize)]
struct MappingsDocument {
    #[serde(default)]
    mappings: IndexMap<String, RawMapping>,
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    endpoint: String,
    method: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    required_params: Vec<String>,
    #[serde(default)]
    optional_params: Vec<String>,
    #[serde(default)]
    response_parser: Option<String>,
    #[serde(default)]
    param_types: IndexMap<String, String>,
}

/// Resolves and parses the mappings source for a process.
#[derive(Debug, Clone)]
pub struct MappingLoader {
    config_dir: PathBuf,
    mappings_file: Option<PathBuf>,
}

impl MappingLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            mappings_file: None,
        }
    }

    /// Loader honouring the configured file and directory.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.config_dir.clone()).with_mappings_file(config.mappings_file.clone())
    }

    pub fn with_mappings_file(mut self, path: Option<PathBuf>) -> Self {
        self.mappings_file = path;
        self
    }

    /// Load the mapping table.
    ///
    /// Precedence: `source`, then the configured mappings file, then the first
    /// existing `tool_mappings.*` in the config directory, then the defaults.
    pub fn load(&self, source: Option<&Path>) -> MappingTable {
        let Some(path) = self.resolve_source(source) else {
            warn!(
                "No mappings file found in {}, using default mappings",
                self.config_dir.display()
            );
            return MappingTable::defaults();
        };

        let candidates = self.available_files();
        if source.is_none() && self.mappings_file.is_none() && candidates.len() > 1 {
            debug!(
                "{} mapping files in {}, using {}",
                candidates.len(),
                self.config_dir.display(),
                path.display()
            );
        }

        match load_file(&path) {
            Ok(table) => {
                info!("Loaded {} tool mappings from {}", table.len(), path.display());
                table
            }
            Err(e) => {
                error!("Error loading mappings from {}: {}", path.display(), e);
                info!("Using default tool mappings");
                MappingTable::defaults()
            }
        }
    }

    /// The file `load` would read, or `None` when the defaults apply.
    pub fn resolve_source(&self, source: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = source {
            return Some(path.to_path_buf());
        }
        if let Some(path) = &self.mappings_file {
            return Some(path.clone());
        }
        MAPPING_FILE_CANDIDATES
            .iter()
            .map(|name| self.config_dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Every `tool_mappings.*` file present in the config directory.
    pub fn available_files(&self) -> Vec<PathBuf> {
        MAPPING_FILE_CANDIDATES
            .iter()
            .map(|name| self.config_dir.join(name))
            .filter(|candidate| candidate.is_file())
            .collect()
    }
}

/// Read and parse one mappings file, choosing the format by extension.
pub fn load_file(path: &Path) -> Result<MappingTable, MappingLoadError> {
    if !path.is_file() {
        return Err(MappingLoadError::NotFound(path.to_path_buf()));
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let contents = fs::read_to_string(path).map_err(|source| MappingLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let table = match extension.as_str() {
        "yaml" | "yml" => parse_yaml(&contents)?,
        "json" => parse_json(&contents)?,
        "properties" => parse_properties(&contents)?,
        _ => return Err(MappingLoadError::UnsupportedFormat(path.to_path_buf())),
    };

    if table.is_empty() {
        return Err(MappingLoadError::Empty(path.to_path_buf()));
    }
    Ok(table)
}

pub fn parse_yaml(contents: &str) -> Result<MappingTable, MappingLoadError> {
    let document: MappingsDocument = serde_yaml::from_str(contents)?;
    from_document(document)
}

pub fn parse_json(contents: &str) -> Result<MappingTable, MappingLoadError> {
    let document: MappingsDocument = serde_json::from_str(contents)?;
    from_document(document)
}

fn from_document(document: MappingsDocument) -> Result<MappingTable, MappingLoadError> {
    let mut mappings = IndexMap::new();
    for (tool, raw) in document.mappings {
        let method = raw
            .method
            .parse::<HttpMethod>()
            .map_err(|reason| MappingLoadError::Schema {
                tool: tool.clone(),
                reason,
            })?;
        let mut mapping = RequestMapping::new(
            raw.endpoint,
            method,
            raw.description.unwrap_or_else(|| default_description(&tool)),
        );
        mapping.required_params = raw.required_params;
        mapping.optional_params = raw.optional_params;
        mapping.response_parser = raw.response_parser.as_deref().and_then(|name| resolve_parser(&tool, name));
        mapping.param_types = resolve_param_types(&tool, raw.param_types);
        mappings.insert(tool, mapping);
    }
    finish(mappings)
}

/// Parse `tool.field=value` lines.
///
/// Keys are grouped by the text before the first dot, wherever they appear in
/// the file. List fields are comma-separated; `param_types` is a list of
/// `name:type` pairs.
pub fn parse_properties(contents: &str) -> Result<MappingTable, MappingLoadError> {
    let mut grouped: IndexMap<String, IndexMap<String, String>> = IndexMap::new();

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            warn!("Ignoring line {} without '=': {}", index + 1, line);
            continue;
        };
        let Some((tool, field)) = key.trim().split_once('.') else {
            debug!("Ignoring property without tool prefix: {}", key.trim());
            continue;
        };
        grouped
            .entry(tool.trim().to_string())
            .or_default()
            .insert(field.trim().to_string(), value.trim().to_string());
    }

    let mut mappings = IndexMap::new();
    for (tool, fields) in grouped {
        let endpoint = fields
            .get("endpoint")
            .filter(|endpoint| !endpoint.is_empty())
            .cloned()
            .ok_or_else(|| MappingLoadError::Schema {
                tool: tool.clone(),
                reason: "missing endpoint".to_string(),
            })?;
        let method = match fields.get("method").filter(|m| !m.is_empty()) {
            Some(method) => method
                .parse::<HttpMethod>()
                .map_err(|reason| MappingLoadError::Schema {
                    tool: tool.clone(),
                    reason,
                })?,
            None => HttpMethod::Get,
        };
        let description = fields
            .get("description")
            .filter(|d| !d.is_empty())
            .cloned()
            .unwrap_or_else(|| default_description(&tool));

        let mut mapping = RequestMapping::new(endpoint, method, description);
        mapping.required_params = split_list(fields.get("required_params"));
        mapping.optional_params = split_list(fields.get("optional_params"));
        mapping.response_parser = fields
            .get("response_parser")
            .filter(|p| !p.is_empty())
            .and_then(|name| resolve_parser(&tool, name));

        let declared_types = split_list(fields.get("param_types"))
            .into_iter()
            .filter_map(|pair| {
                let (name, ty) = pair.split_once(':')?;
                Some((name.trim().to_string(), ty.trim().to_string()))
            })
            .collect();
        mapping.param_types = resolve_param_types(&tool, declared_types);

        mappings.insert(tool, mapping);
    }
    finish(mappings)
}

fn split_list(value: Option<&String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn default_description(tool: &str) -> String {
    format!("Tool: {}", tool)
}

fn resolve_parser(tool: &str, name: &str) -> Option<ResponseParser> {
    match ResponseParser::from_name(name) {
        Some(parser) => Some(parser),
        None => {
            warn!(
                "Tool '{}' names unknown response parser '{}', using structural parsing",
                tool, name
            );
            Some(ResponseParser::Structural)
        }
    }
}

fn resolve_param_types(tool: &str, declared: IndexMap<String, String>) -> IndexMap<String, ParamType> {
    declared
        .into_iter()
        .map(|(param, ty)| {
            let resolved = ParamType::from_name(&ty).unwrap_or_else(|| {
                warn!(
                    "Tool '{}' declares unknown type '{}' for '{}', using string",
                    tool, ty, param
                );
                ParamType::String
            });
            (param, resolved)
        })
        .collect()
}

/// Apply the load-time checks shared by every format.
fn finish(mappings: IndexMap<String, RequestMapping>) -> Result<MappingTable, MappingLoadError> {
    let mut checked = IndexMap::new();
    for (tool, mut mapping) in mappings {
        if tool == PASSTHROUGH_TOOL {
            warn!("Skipping mapping '{}': the name is reserved", tool);
            continue;
        }
        let endpoint = mapping.endpoint.trim();
        if endpoint.is_empty() {
            return Err(MappingLoadError::Schema {
                tool,
                reason: "missing endpoint".to_string(),
            });
        }
        mapping.endpoint = if endpoint.starts_with('/') {
            endpoint.to_string()
        } else {
            warn!("Tool '{}' endpoint '{}' does not start with '/', prefixing it", tool, endpoint);
            format!("/{}", endpoint)
        };

        dedup(&mut mapping.required_params);
        dedup(&mut mapping.optional_params);

        let required = mapping.required_params.clone();
        mapping.optional_params.retain(|param| {
            let overlaps = required.contains(param);
            if overlaps {
                warn!(
                    "Tool '{}' declares '{}' as both required and optional, keeping it required",
                    tool, param
                );
            }
            !overlaps
        });

        for placeholder in mapping.placeholders() {
            if !mapping.all_params().any(|param| param == placeholder) {
                warn!(
                    "Tool '{}' endpoint placeholder '{{{}}}' is not a declared parameter",
                    tool, placeholder
                );
            }
        }

        debug!(
            "Mapped tool '{}' to {} {} ({})",
            tool,
            mapping.method,
            mapping.endpoint,
            mapping.response_parser.map_or("raw", |parser| parser.name())
        );
        checked.insert(tool, mapping);
    }
    Ok(MappingTable::new(checked))
}

fn dedup(params: &mut Vec<String>) {
    let mut seen = Vec::with_capacity(params.len());
    params.retain(|param| {
        if seen.contains(param) {
            false
        } else {
            seen.push(param.clone());
            true
        }
    });
}
