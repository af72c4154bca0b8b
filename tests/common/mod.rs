// Shared helpers for the HTTP integration tests
// The real connector talks to a mockito server standing in for MuckRock

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use muckrock_gateway::{
    auth::{AuthManager, PendingLogins, SessionSettings},
    muckrock::{HttpConnector, HttpConnectorConfig},
    routes::{self, AppState},
    rpc::RpcHandler,
    tools::ToolRegistry,
};

pub const API_KEY: &str = "integration-key";

pub fn connector(server: &mockito::ServerGuard) -> Arc<HttpConnector> {
    Arc::new(
        HttpConnector::new(HttpConnectorConfig {
            api_url: format!("{}/api_v2/", server.url()),
            token_url: format!("{}/api/token/", server.url()),
            connect_timeout: 5,
            request_timeout: 5,
            max_retries: 0,
            retry_base_delay_ms: 1,
        })
        .expect("Failed to create connector"),
    )
}

pub fn manager(server: &mockito::ServerGuard) -> AuthManager {
    AuthManager::new(connector(server), SessionSettings {
        login_timeout: std::time::Duration::from_secs(5),
        ..SessionSettings::default()
    })
}

pub fn create_app(manager: AuthManager, api_key: Option<&str>) -> Router {
    let tools = ToolRegistry::new(manager, PendingLogins::new(chrono::Duration::minutes(10)));
    let state = AppState::new(RpcHandler::new(tools), api_key.map(str::to_string));
    routes::app(state)
}

/// Paged list body the way the records API returns it
pub fn page(results: Value) -> String {
    json!({"count": results.as_array().map(Vec::len).unwrap_or(0), "next": null, "results": results})
        .to_string()
}

pub fn rpc(id: u64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

pub fn tool_call(id: u64, name: &str, arguments: Value) -> Value {
    rpc(id, "tools/call", json!({"name": name, "arguments": arguments}))
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

pub async fn post_mcp(
    app: &Router,
    body: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

/// Text content of a tools/call result
pub fn tool_text(response: &Value) -> String {
    response["result"]["content"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}
