//! Unit tests for envelope and tool validation

#[cfg(test)]
mod tests {
    use super::super::error::ErrorCode;
    use super::super::model::Request;
    use super::super::validation::*;
    use assert_matches::assert_matches;
    use serde_json::{Value, json};

    fn valid_tool(name: &str) -> Value {
        json!({
            "name": name,
            "description": format!("{name} tool"),
            "inputSchema": {
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }
        })
    }

    #[test]
    fn test_list_tools_request_shape() {
        let request = Request::list_tools();
        assert_eq!(request.jsonrpc, "2.0");
        assert_eq!(request.method, "tools/list");
        assert!(request.params.is_object());
        assert!(request.id.is_string());

        let other = Request::list_tools();
        assert_ne!(request.id, other.id, "each request gets a fresh id");
    }

    #[test]
    fn test_parse_plain_and_sse_bodies() {
        let plain = parse_body(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert_eq!(plain["id"], 1);

        let sse = parse_body("event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{}}\n\n")
            .unwrap();
        assert_eq!(sse["id"], 2);

        let empty_sse = parse_body("event: message\n");
        assert!(empty_sse.is_err());

        let garbage = parse_body("<html>oops</html>").unwrap_err();
        assert_eq!(garbage.code, ErrorCode::ParseError);
    }

    #[test]
    fn test_valid_success_envelope() {
        let id = json!("abc");
        let envelope =
            validate_response_envelope(&json!({"jsonrpc": "2.0", "id": "abc", "result": {"tools": []}}), &id)
                .unwrap();
        assert_eq!(envelope.id, id);
        assert!(envelope.outcome.is_ok());
    }

    #[test]
    fn test_valid_error_envelope() {
        let id = json!(7);
        let envelope = validate_response_envelope(
            &json!({"jsonrpc": "2.0", "id": 7, "error": {"code": -32601, "message": "Method not found"}}),
            &id,
        )
        .unwrap();
        let error = envelope.outcome.unwrap_err();
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "Method not found");
    }

    #[test]
    fn test_malformed_envelopes_rejected() {
        let id = json!(1);
        let cases = vec![
            json!([]),
            json!({"id": 1, "result": {}}),
            json!({"jsonrpc": "1.0", "id": 1, "result": {}}),
            json!({"jsonrpc": "2.0", "result": {}}),
            json!({"jsonrpc": "2.0", "id": 1}),
            json!({"jsonrpc": "2.0", "id": 1, "result": {}, "error": {"code": 1, "message": "x"}}),
            json!({"jsonrpc": "2.0", "id": 2, "result": {}}),
        ];

        for case in cases {
            let err = validate_response_envelope(&case, &id).unwrap_err();
            assert_eq!(err.code, ErrorCode::MalformedEnvelope, "case: {case}");
        }
    }

    #[test]
    fn test_malformed_error_object_rejected() {
        let id = json!(1);
        let missing_code = json!({"jsonrpc": "2.0", "id": 1, "error": {"message": "boom"}});
        let string_code = json!({"jsonrpc": "2.0", "id": 1, "error": {"code": "x", "message": "boom"}});
        let missing_message = json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000}});

        for case in [missing_code, string_code, missing_message] {
            assert_matches!(
                validate_response_envelope(&case, &id),
                Err(e) if e.code == ErrorCode::MalformedEnvelope
            );
        }
    }

    #[test]
    fn test_null_id_allowed_for_parse_errors_only() {
        let id = json!("sent");
        let error_with_null = json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "Parse error"}});
        assert!(validate_response_envelope(&error_with_null, &id).is_ok());

        let result_with_null = json!({"jsonrpc": "2.0", "id": null, "result": {}});
        assert!(validate_response_envelope(&result_with_null, &id).is_err());
    }

    #[test]
    fn test_parse_list_tools_requires_array() {
        assert!(parse_list_tools(json!({"tools": []})).is_ok());
        assert!(parse_list_tools(json!({"tools": {}})).is_err());
        assert!(parse_list_tools(json!({})).is_err());

        let paged = parse_list_tools(json!({"tools": [], "nextCursor": "p2"})).unwrap();
        assert_eq!(paged.next_cursor.as_deref(), Some("p2"));
    }

    #[test]
    fn test_validate_tool_accepts_complete_entry() {
        let tool = validate_tool(0, &valid_tool("search")).unwrap();
        assert_eq!(tool.name, "search");
        assert_eq!(tool.description, "search tool");
    }

    #[test]
    fn test_validate_tool_collects_all_defects() {
        let malformed = validate_tool(3, &json!({"name": "", "inputSchema": "nope"})).unwrap_err();
        assert_eq!(malformed.name, "<unnamed #3>");
        assert_eq!(malformed.reasons.len(), 3);

        let no_schema = validate_tool(0, &json!({"name": "lookup", "description": "d"})).unwrap_err();
        assert_eq!(no_schema.name, "lookup");
        assert_eq!(no_schema.reasons, vec!["Tool inputSchema is missing".to_string()]);
    }

    #[test]
    fn test_validate_json_schema_rules() {
        assert!(validate_json_schema(&json!({"type": "object"})).is_ok());
        assert!(validate_json_schema(&json!({"type": "object", "properties": {}})).is_ok());
        assert!(validate_json_schema(&json!("object")).is_err());
        assert!(validate_json_schema(&json!({"properties": {}})).is_err());
        assert!(validate_json_schema(&json!({"type": "string"})).is_err());
        assert!(validate_json_schema(&json!({"type": "object", "properties": []})).is_err());
        assert!(
            validate_json_schema(&json!({"type": "object", "properties": {"a": {"type": 12}}}))
                .is_err(),
            "schemas that do not compile are rejected"
        );
    }

    #[test]
    fn test_inventory_reports_missing_tools() {
        let entries = vec![valid_tool("search")];
        let expected = vec!["search".to_string(), "recommend".to_string()];
        let inventory = check_inventory(&entries, &expected);

        assert_eq!(inventory.discovered, vec!["search".to_string()]);
        assert_eq!(inventory.missing, vec!["recommend".to_string()]);
        assert!(inventory.malformed.is_empty());
        assert!(!inventory.is_complete());
    }

    #[test]
    fn test_inventory_keeps_malformed_tools_visible() {
        let entries = vec![
            valid_tool("search"),
            json!({"name": "recommend", "description": "", "inputSchema": {"type": "object"}}),
        ];
        let expected = vec!["search".to_string(), "recommend".to_string()];
        let inventory = check_inventory(&entries, &expected);

        assert!(inventory.missing.is_empty(), "malformed tools are not missing");
        assert_eq!(inventory.malformed.len(), 1);
        assert_eq!(inventory.malformed[0].name, "recommend");
        assert_eq!(inventory.discovered.len(), 2);
        assert!(!inventory.is_complete());
    }

    #[test]
    fn test_inventory_complete() {
        let entries = vec![valid_tool("a"), valid_tool("b"), valid_tool("extra")];
        let expected = vec!["a".to_string(), "b".to_string()];
        assert!(check_inventory(&entries, &expected).is_complete());
    }
}
