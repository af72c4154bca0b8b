// JSON-RPC 2.0 message handling for the MCP protocol
// Shared by the stdio and HTTP transports

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tools::ToolRegistry;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "muckrock-gateway";
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

/// JSON-RPC 2.0 request or notification
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    /// Absent for notifications
    #[serde(default)]
    pub id: Option<Value>,
}

impl RpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none() || self.method.starts_with("notifications/")
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Routes MCP methods to the tool registry
#[derive(Clone)]
pub struct RpcHandler {
    tools: ToolRegistry,
}

impl RpcHandler {
    pub fn new(tools: ToolRegistry) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Handle one raw message. Returns None for notifications.
    pub async fn handle_message(&self, session_key: &str, raw: &str) -> Option<RpcResponse> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Failed to parse JSON-RPC message: {}", e);
                return Some(RpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };
        self.handle_value(session_key, value).await
    }

    pub async fn handle_value(&self, session_key: &str, value: Value) -> Option<RpcResponse> {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<RpcRequest>(value) {
            Ok(request) => self.handle(session_key, request).await,
            Err(e) => Some(RpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("Invalid request: {}", e),
            )),
        }
    }

    pub async fn handle(&self, session_key: &str, request: RpcRequest) -> Option<RpcResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "Notification received");
            return None;
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        tracing::debug!(method = %request.method, session = session_key, "JSON-RPC request");

        let response = match request.method.as_str() {
            "initialize" => RpcResponse::success(id, initialize_result()),
            "ping" => RpcResponse::success(id, json!({})),
            "tools/list" => RpcResponse::success(id, json!({"tools": self.tools.definitions()})),
            "tools/call" => self.call_tool(session_key, id, request.params).await,
            other => {
                tracing::warn!("Unknown JSON-RPC method: {}", other);
                RpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", other))
            }
        };

        Some(response)
    }

    async fn call_tool(&self, session_key: &str, id: Value, params: Option<Value>) -> RpcResponse {
        let params: CallParams = match params.map(serde_json::from_value::<CallParams>) {
            Some(Ok(p)) => p,
            Some(Err(e)) => {
                return RpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e))
            }
            None => return RpcResponse::error(id, INVALID_PARAMS, "Missing params"),
        };

        let output = self
            .tools
            .call(session_key, &params.name, params.arguments)
            .await;

        RpcResponse::success(
            id,
            json!({
                "content": [{"type": "text", "text": output.text}],
                "isError": output.is_error
            }),
        )
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {"tools": {"listChanged": false}},
        "serverInfo": {"name": SERVER_NAME, "version": VERSION}
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::FakeConnector;
    use crate::auth::{AuthManager, PendingLogins, SessionSettings};

    fn handler() -> RpcHandler {
        let manager = AuthManager::new(FakeConnector::new(), SessionSettings::default());
        RpcHandler::new(ToolRegistry::new(
            manager,
            PendingLogins::new(chrono::Duration::minutes(10)),
        ))
    }

    #[tokio::test]
    async fn test_initialize_reports_server_info() {
        let response = handler()
            .handle_message("s", r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert!(result["capabilities"]["tools"].is_object());
        assert_eq!(response.id, json!(1));
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let handler = handler();
        assert!(handler
            .handle_message("s", r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .is_none());
        assert!(handler
            .handle_message("s", r#"{"jsonrpc":"2.0","method":"ping"}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_parse_error() {
        let response = handler().handle_message("s", "{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);
        assert_eq!(response.id, Value::Null);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = handler()
            .handle_message("s", r#"{"jsonrpc":"2.0","id":"a","method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tools_list_contains_catalogue() {
        let response = handler()
            .handle_message("s", r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await
            .unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 21);
        assert!(tools.iter().any(|t| t["name"] == "check_auth_status"));
        assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
    }

    #[tokio::test]
    async fn test_tools_call_missing_params() {
        let response = handler()
            .handle_message("s", r#"{"jsonrpc":"2.0","id":3,"method":"tools/call"}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tools_call_wraps_text_content() {
        let response = handler()
            .handle_message(
                "s",
                r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"check_auth_status","arguments":{}}}"#,
            )
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["type"], "text");
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Not authenticated"));
    }

    #[tokio::test]
    async fn test_tool_failure_is_result_not_rpc_error() {
        let response = handler()
            .handle_message(
                "s",
                r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"get_my_requests"}}"#,
            )
            .await
            .unwrap();
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["isError"], true);
    }
}
