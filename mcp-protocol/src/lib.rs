//! JSON-RPC and MCP `tools/list` types for health probing
//!
//! This crate holds the protocol half of the RPC probe: it builds the
//! `tools/list` request, checks that a response is a well-formed JSON-RPC 2.0
//! envelope, and validates each returned tool entry.
//!
//! # Quick Start
//!
//! ```rust
//! use mcp_health_protocol::{Request, check_inventory, parse_list_tools, validate_response_envelope};
//! use serde_json::json;
//!
//! let request = Request::list_tools();
//! let response = json!({
//!     "jsonrpc": "2.0",
//!     "id": request.id.clone(),
//!     "result": {
//!         "tools": [{
//!             "name": "search",
//!             "description": "Full text search",
//!             "inputSchema": {"type": "object", "properties": {"q": {"type": "string"}}}
//!         }]
//!     }
//! });
//!
//! let envelope = validate_response_envelope(&response, &request.id).unwrap();
//! let tools = parse_list_tools(envelope.outcome.unwrap()).unwrap();
//! let inventory = check_inventory(&tools.tools, &["search".to_string(), "recommend".to_string()]);
//! assert_eq!(inventory.missing, vec!["recommend".to_string()]);
//! ```

pub mod error;
pub mod model;
pub mod validation;

pub use error::{Error, ErrorCode, Result};
pub use model::{ErrorObject, ListToolsResult, MalformedTool, Request, ResponseEnvelope, Tool};
pub use validation::{
    ToolInventory, check_inventory, parse_body, parse_list_tools, validate_error_object,
    validate_json_schema, validate_response_envelope, validate_tool,
};

/// JSON-RPC version carried in every envelope
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision announced by the probe
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Header carrying the protocol revision on HTTP transports
pub const PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";

/// Method used as the RPC liveness and capability check
pub const METHOD_TOOLS_LIST: &str = "tools/list";

#[cfg(test)]
mod validation_tests;
