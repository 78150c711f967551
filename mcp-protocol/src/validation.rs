//! Validation of JSON-RPC responses and `tools/list` payloads

use crate::model::{ErrorObject, ListToolsResult, MalformedTool, ResponseEnvelope, Tool};
use crate::{Error, JSONRPC_VERSION, Result};
use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::BTreeSet;

/// Parse a response body that is either plain JSON or SSE framed
///
/// Streamable HTTP servers answer POSTs with `event: message\ndata: {...}`.
pub fn parse_body(body: &str) -> Result<Value> {
    let trimmed = body.trim();

    if trimmed.starts_with("event:") || trimmed.starts_with("data:") {
        for line in trimmed.lines() {
            if let Some(json_str) = line.trim().strip_prefix("data:") {
                let json_str = json_str.trim();
                if !json_str.is_empty() {
                    return Ok(serde_json::from_str(json_str)?);
                }
            }
        }
        return Err(Error::parse_error("SSE body carried no data line"));
    }

    Ok(serde_json::from_str(trimmed)?)
}

/// Validate a JSON-RPC response envelope against the id that was sent
pub fn validate_response_envelope(message: &Value, expected_id: &Value) -> Result<ResponseEnvelope> {
    let obj = message
        .as_object()
        .ok_or_else(|| Error::malformed_envelope("Response must be a JSON object"))?;

    match obj.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(other) => {
            return Err(Error::malformed_envelope(format!(
                "Invalid JSON-RPC version: expected '2.0', got '{other}'"
            )));
        }
        None => return Err(Error::malformed_envelope("Missing required 'jsonrpc' field")),
    }

    let id = obj
        .get("id")
        .cloned()
        .ok_or_else(|| Error::malformed_envelope("Missing required 'id' field"))?;

    let result = obj.get("result");
    let error = obj.get("error");

    let outcome = match (result, error) {
        (Some(_), Some(_)) => {
            return Err(Error::malformed_envelope(
                "Response cannot carry both 'result' and 'error'",
            ));
        }
        (None, None) => {
            return Err(Error::malformed_envelope(
                "Response must carry either 'result' or 'error'",
            ));
        }
        (Some(result), None) => Ok(result.clone()),
        (None, Some(error)) => Err(validate_error_object(error)?),
    };

    // A server may null the id when it could not parse the request
    if id != *expected_id && !(id.is_null() && outcome.is_err()) {
        return Err(Error::malformed_envelope(format!(
            "Response id {id} does not match request id {expected_id}"
        )));
    }

    Ok(ResponseEnvelope { id, outcome })
}

/// Validate the shape of a JSON-RPC error object
pub fn validate_error_object(error: &Value) -> Result<ErrorObject> {
    let obj = error
        .as_object()
        .ok_or_else(|| Error::malformed_envelope("Error must be an object"))?;

    let code = obj
        .get("code")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::malformed_envelope("Error object requires an integer 'code'"))?;

    let message = obj
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::malformed_envelope("Error object requires a string 'message'"))?;

    Ok(ErrorObject {
        code,
        message: message.to_string(),
        data: obj.get("data").cloned(),
    })
}

/// Extract the raw tool list from a `tools/list` result
pub fn parse_list_tools(result: Value) -> Result<ListToolsResult> {
    if !result.get("tools").is_some_and(Value::is_array) {
        return Err(Error::malformed_envelope(
            "tools/list result requires a 'tools' array",
        ));
    }
    Ok(serde_json::from_value(result)?)
}

/// Validate one tool entry, collecting every defect
pub fn validate_tool(index: usize, entry: &Value) -> std::result::Result<Tool, MalformedTool> {
    let mut reasons = Vec::new();

    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty());
    if name.is_none() {
        reasons.push("Tool name cannot be empty".to_string());
    }

    let description = entry
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|description| !description.is_empty());
    if description.is_none() {
        reasons.push("Tool description cannot be empty".to_string());
    }

    match entry.get("inputSchema") {
        Some(schema) => {
            if let Err(e) = validate_json_schema(schema) {
                reasons.push(e.message);
            }
        }
        None => reasons.push("Tool inputSchema is missing".to_string()),
    }

    match (name, description, reasons.is_empty()) {
        (Some(name), Some(description), true) => Ok(Tool {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: entry.get("inputSchema").cloned().unwrap_or_default(),
        }),
        _ => Err(MalformedTool {
            name: name
                .map(str::to_string)
                .unwrap_or_else(|| format!("<unnamed #{index}>")),
            reasons,
        }),
    }
}

/// Validate a tool input schema
///
/// The schema must be an object typed `"object"` and must compile.
pub fn validate_json_schema(schema: &Value) -> Result<()> {
    let Some(obj) = schema.as_object() else {
        return Err(Error::validation_error("JSON schema must be an object"));
    };

    match obj.get("type") {
        Some(Value::String(t)) if t == "object" => {}
        Some(other) => {
            return Err(Error::validation_error(format!(
                "Tool input schema must have type 'object', got {other}"
            )));
        }
        None => {
            return Err(Error::validation_error(
                "JSON schema must have a 'type' field",
            ));
        }
    }

    if let Some(properties) = obj.get("properties") {
        if !properties.is_object() {
            return Err(Error::validation_error(
                "JSON schema 'properties' must be an object",
            ));
        }
    }

    JSONSchema::compile(schema)
        .map(|_| ())
        .map_err(|e| Error::validation_error(format!("JSON schema does not compile: {e}")))
}

/// Outcome of checking a tool list against the expected inventory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolInventory {
    /// Every tool name the server reported, valid or not
    pub discovered: Vec<String>,
    /// Expected tools the server did not report
    pub missing: Vec<String>,
    /// Entries that failed validation
    pub malformed: Vec<MalformedTool>,
}

impl ToolInventory {
    /// True when nothing is missing and nothing is malformed
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.malformed.is_empty()
    }
}

/// Check raw tool entries against the expected tool names
pub fn check_inventory<'a, I>(entries: &[Value], expected: I) -> ToolInventory
where
    I: IntoIterator<Item = &'a String>,
{
    let mut inventory = ToolInventory::default();

    for (index, entry) in entries.iter().enumerate() {
        match validate_tool(index, entry) {
            Ok(tool) => inventory.discovered.push(tool.name),
            Err(malformed) => {
                if !malformed.name.starts_with("<unnamed") {
                    inventory.discovered.push(malformed.name.clone());
                }
                inventory.malformed.push(malformed);
            }
        }
    }

    let reported: BTreeSet<&str> = inventory.discovered.iter().map(String::as_str).collect();
    let mut missing: Vec<String> = expected
        .into_iter()
        .filter(|name| !reported.contains(name.as_str()))
        .cloned()
        .collect();
    missing.sort();
    missing.dedup();
    inventory.missing = missing;

    inventory
}
