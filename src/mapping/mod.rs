//! Tool Mapping Module
//!
//! - table.rs: `RequestMapping`, `MappingTable` and the built-in defaults
//! - loader.rs: YAML/JSON/properties loading with default fallback

pub mod loader;
pub mod table;

pub use loader::MappingLoader;
pub use table::{HttpMethod, MappingTable, PASSTHROUGH_TOOL, RequestMapping, ResponseParser};
