//! JSON-RPC envelope and MCP tool types used by the RPC probe

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request method name
    pub method: String,
    /// Request parameters
    #[serde(default = "serde_json::Value::default")]
    pub params: Value,
    /// Request ID
    pub id: Value,
}

impl Request {
    /// Build a request with a fresh correlation id
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: crate::JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: Value::String(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Build a `tools/list` request
    pub fn list_tools() -> Self {
        Self::new(crate::METHOD_TOOLS_LIST, Value::Object(Default::default()))
    }

    /// Continue a paginated `tools/list`
    pub fn list_tools_page(cursor: &str) -> Self {
        Self::new(
            crate::METHOD_TOOLS_LIST,
            serde_json::json!({ "cursor": cursor }),
        )
    }

    /// Correlation id as a display string
    pub fn id_string(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// JSON-RPC error object as returned by a server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A validated response envelope
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    /// Id echoed by the server
    pub id: Value,
    /// `result` on success, the error object otherwise
    pub outcome: std::result::Result<Value, ErrorObject>,
}

/// A tool entry that passed validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// List tools result, kept raw so that malformed entries can be reported
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Why a tool entry was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedTool {
    /// Name of the tool, or `<unnamed #index>` when the name itself is missing
    pub name: String,
    /// Every defect found on the entry
    pub reasons: Vec<String>,
}
