//! Tools Module
//!
//! The request pipeline behind every MCP tool: the dispatcher resolves a tool
//! call against the mapping table, the builder turns arguments into an HTTP
//! request, the executor sends it, and the normalizer and formatter turn the
//! response into text for the calling agent.

pub mod builder;
pub mod dispatcher;
pub mod executor;
pub mod format;
pub mod normalizer;
pub mod semantic;
#[cfg(test)]
pub mod testing;
