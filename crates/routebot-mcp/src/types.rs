//! JSON-RPC 2.0 message types and MCP protocol structures.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Header carrying the server-assigned session id.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message. A `None` id makes it a notification.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method: method.to_string(),
            params,
        }
    }

    pub fn notification(method: &str) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method: method.to_string(),
            params: None,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// Entry of a `tools/list` result.
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

/// Entry of a `resources/list` result.
#[derive(Debug, Clone, Deserialize)]
pub struct McpResourceDefinition {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "mimeType")]
    pub mime_type: Option<String>,
}

/// `tools/list` result page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsListResult {
    #[serde(default)]
    pub tools: Vec<McpToolDefinition>,
    #[serde(default, rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// `resources/list` result page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourcesListResult {
    #[serde(default)]
    pub resources: Vec<McpResourceDefinition>,
    #[serde(default, rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// `tools/call` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
    #[serde(default, rename = "structuredContent")]
    pub structured_content: Option<Value>,
}

/// `resources/read` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceReadResult {
    #[serde(default)]
    pub contents: Vec<Value>,
}

/// Server info returned in the initialize response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// MCP initialize response payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitializeResult {
    #[serde(default, rename = "protocolVersion")]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default, rename = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

impl InitializeResult {
    /// Whether the server advertised the `resources` capability.
    pub fn supports_resources(&self) -> bool {
        self.capabilities.get("resources").is_some()
    }
}

// ─── Standard MCP Error Codes ────────────────────────────────────────────────

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ─── Content helpers ─────────────────────────────────────────────────────────

/// Collapse MCP content blocks into one JSON payload.
///
/// Text blocks holding JSON are decoded; a single block is returned bare, several
/// as an array.
pub fn content_to_payload(blocks: &[Value]) -> Value {
    let mut values: Vec<Value> = blocks
        .iter()
        .map(|block| match block.get("text").and_then(Value::as_str) {
            Some(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.into())),
            None => block.clone(),
        })
        .collect();
    match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::Array(values),
    }
}

/// Plain text of content blocks, joined by newlines.
pub fn content_text(blocks: &[Value]) -> String {
    blocks
        .iter()
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_and_notification_serialization() {
        let req = JsonRpcRequest::new(7, "tools/list", None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert!(json.get("params").is_none());

        let note = serde_json::to_value(JsonRpcRequest::notification("notifications/initialized"))
            .unwrap();
        assert!(note.get("id").is_none());
    }

    #[test]
    fn test_tools_list_deserialization() {
        let raw = json!({
            "tools": [{
                "name": "search_products",
                "description": "Search",
                "inputSchema": {"type": "object", "properties": {"category": {"type": "string"}}}
            }]
        });
        let list: ToolsListResult = serde_json::from_value(raw).unwrap();
        assert_eq!(list.tools.len(), 1);
        assert_eq!(list.tools[0].input_schema["type"], "object");
        assert!(list.next_cursor.is_none());
    }

    #[test]
    fn test_content_to_payload_decodes_json_text() {
        let blocks = vec![json!({"type": "text", "text": "[{\"id\": 1}, {\"id\": 2}]"})];
        assert_eq!(content_to_payload(&blocks), json!([{"id": 1}, {"id": 2}]));
    }

    #[test]
    fn test_content_to_payload_plain_and_multi() {
        let one = vec![json!({"type": "text", "text": "hello"})];
        assert_eq!(content_to_payload(&one), json!("hello"));

        let two = vec![
            json!({"type": "text", "text": "1"}),
            json!({"type": "image", "data": "..."}),
        ];
        let payload = content_to_payload(&two);
        assert_eq!(payload[0], json!(1));
        assert_eq!(payload[1]["type"], "image");

        assert_eq!(content_to_payload(&[]), Value::Null);
    }

    #[test]
    fn test_content_text() {
        let blocks = vec![json!({"type": "text", "text": "a"}), json!({"type": "text", "text": "b"})];
        assert_eq!(content_text(&blocks), "a\nb");
    }
}
