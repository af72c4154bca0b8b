// Integration tests for the MuckRock gateway
//
// These tests drive the full HTTP stack: routing, API key middleware,
// JSON-RPC dispatch, tool handlers, the session manager and the real
// HTTP connector against a mock records API.

mod common;

use axum::http::StatusCode;
use mockito::Matcher;
use serde_json::{json, Value};

use common::*;
use muckrock_gateway::auth::Credentials;

fn credentials(username: &str, password: &str) -> Credentials {
    Credentials::new(username, password)
}

// ==================================================================================================
// Health
// ==================================================================================================

#[tokio::test]
async fn test_root_reports_ok() {
    let server = mockito::Server::new_async().await;
    let app = create_app(manager(&server), None);

    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_health_reports_anonymous_session_without_api_key() {
    let server = mockito::Server::new_async().await;
    let app = create_app(manager(&server), Some(API_KEY));

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["session"]["authenticated"], false);
    assert_eq!(body["session"]["access_type"], "anonymous");
}

// ==================================================================================================
// Protocol
// ==================================================================================================

#[tokio::test]
async fn test_initialize_assigns_session_header() {
    let server = mockito::Server::new_async().await;
    let app = create_app(manager(&server), None);

    let body = rpc(1, "initialize", json!({})).to_string();
    let (status, headers, response) = post_mcp(&app, &body, &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(response["result"]["serverInfo"]["name"], "muckrock-gateway");
    let session = headers.get("mcp-session-id").unwrap().to_str().unwrap();
    assert_eq!(session.len(), 36);

    // A caller that already has a session keeps it
    let (_, headers, _) = post_mcp(&app, &body, &[("mcp-session-id", "existing")]).await;
    assert!(headers.get("mcp-session-id").is_none());
}

#[tokio::test]
async fn test_tools_list_over_http() {
    let server = mockito::Server::new_async().await;
    let app = create_app(manager(&server), None);

    let body = rpc(2, "tools/list", json!({})).to_string();
    let (status, _, response) = post_mcp(&app, &body, &[]).await;

    assert_eq!(status, StatusCode::OK);
    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 21);
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert!(names.contains(&"search_foia_requests"));
    assert!(names.contains(&"file_foia_request"));
}

#[tokio::test]
async fn test_notification_is_accepted_without_body() {
    let server = mockito::Server::new_async().await;
    let app = create_app(manager(&server), None);

    let body = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
    let (status, _, response) = post_mcp(&app, &body, &[]).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(response, Value::Null);
}

#[tokio::test]
async fn test_malformed_body_yields_parse_error() {
    let server = mockito::Server::new_async().await;
    let app = create_app(manager(&server), None);

    let (status, _, response) = post_mcp(&app, "{\"jsonrpc\": ", &[]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["error"]["code"], -32700);
    assert_eq!(response["id"], Value::Null);
}

// ==================================================================================================
// API key
// ==================================================================================================

#[tokio::test]
async fn test_mcp_requires_configured_api_key() {
    let server = mockito::Server::new_async().await;
    let app = create_app(manager(&server), Some(API_KEY));
    let body = rpc(3, "ping", json!({})).to_string();

    let (status, _, response) = post_mcp(&app, &body, &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"]["type"], "auth_error");

    let bearer = format!("Bearer {}", API_KEY);
    let (status, _, response) = post_mcp(&app, &body, &[("authorization", &bearer)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["id"], 3);

    let (status, _, _) = post_mcp(&app, &body, &[("x-api-key", API_KEY)]).await;
    assert_eq!(status, StatusCode::OK);
}

// ==================================================================================================
// Tools against the mock records API
// ==================================================================================================

#[tokio::test]
async fn test_anonymous_search_sends_no_credentials() {
    let mut server = mockito::Server::new_async().await;
    let requests = server
        .mock("GET", "/api_v2/requests/")
        .match_query(Matcher::UrlEncoded("search".into(), "police".into()))
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(json!([
            {"id": 17, "title": "Police use of force records", "status": "done", "agency": 4}
        ])))
        .create_async()
        .await;

    let app = create_app(manager(&server), None);
    let body = tool_call(4, "search_foia_requests", json!({"query": "police"})).to_string();
    let (_, _, response) = post_mcp(&app, &body, &[]).await;

    requests.assert_async().await;
    assert_eq!(response["result"]["isError"], false);
    let text = tool_text(&response);
    assert!(text.contains("Found 1 FOIA requests matching 'police'"));
    assert!(text.contains("Police use of force records"));
}

#[tokio::test]
async fn test_auth_required_tool_makes_no_remote_call() {
    let mut server = mockito::Server::new_async().await;
    let any = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let app = create_app(manager(&server), None);
    let body = tool_call(5, "get_my_requests", json!({})).to_string();
    let (_, _, response) = post_mcp(&app, &body, &[]).await;

    any.assert_async().await;
    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).contains("Authentication required"));
}

#[tokio::test]
async fn test_authenticate_tool_switches_session() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", "/api/token/")
        .match_body(Matcher::PartialJson(json!({"username": "reporter"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access": "token-1", "refresh": "r"}).to_string())
        .create_async()
        .await;
    let me = server
        .mock("GET", "/api_v2/users/me/")
        .match_header("authorization", "Bearer token-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"id": 42, "username": "reporter"}).to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/api_v2/organizations/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(page(json!([{"id": 1, "name": "Newsroom"}])))
        .create_async()
        .await;

    let manager = manager(&server);
    let app = create_app(manager.clone(), None);
    let body = tool_call(
        6,
        "authenticate",
        json!({"username": "reporter", "password": "correct horse"}),
    )
    .to_string();
    let (_, _, response) = post_mcp(&app, &body, &[]).await;

    token.assert_async().await;
    me.assert_async().await;
    assert_eq!(response["result"]["isError"], false);
    let text = tool_text(&response);
    assert!(text.contains("Successfully authenticated"));
    assert!(text.contains("Newsroom"));
    assert!(!text.contains("correct horse"));

    assert!(manager.is_authenticated().await);
    let (_, health) = get(&app, "/health").await;
    assert_eq!(health["session"]["username"], "reporter");
}

#[tokio::test]
async fn test_rejected_login_keeps_anonymous_session() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/token/")
        .with_status(400)
        .with_body(r#"{"detail":"No active account found with the given credentials"}"#)
        .create_async()
        .await;

    let manager = manager(&server);
    let app = create_app(manager.clone(), None);
    let body = tool_call(
        7,
        "authenticate",
        json!({"username": "reporter", "password": "wrong"}),
    )
    .to_string();
    let (_, _, response) = post_mcp(&app, &body, &[]).await;

    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).contains("Authentication failed"));
    assert!(!manager.is_authenticated().await);
}

#[tokio::test]
async fn test_startup_login_failure_falls_back_to_anonymous() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/token/")
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let manager = manager(&server);
    manager
        .initialize(Some(credentials("reporter", "pw")))
        .await;
    assert!(!manager.is_authenticated().await);

    let app = create_app(manager, None);
    let body = tool_call(8, "check_auth_status", json!({})).to_string();
    let (_, _, response) = post_mcp(&app, &body, &[]).await;
    let text = tool_text(&response);
    assert!(text.contains("Not authenticated"));
    assert!(text.contains("Login as reporter failed"));
}

#[tokio::test]
async fn test_startup_login_then_logout_tool() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/token/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access": "token-9"}).to_string())
        .create_async()
        .await;

    let manager = manager(&server);
    manager
        .initialize(Some(credentials("reporter", "pw")))
        .await;
    assert!(manager.is_authenticated().await);

    let app = create_app(manager.clone(), None);
    let body = tool_call(9, "logout", json!({})).to_string();
    let (_, _, response) = post_mcp(&app, &body, &[]).await;

    assert_eq!(response["result"]["isError"], false);
    assert!(!manager.is_authenticated().await);
}

#[tokio::test]
async fn test_headerless_callers_cannot_share_pending_username() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", "/api/token/")
        .expect(0)
        .create_async()
        .await;

    let manager = manager(&server);
    let app = create_app(manager.clone(), None);

    // Client A stages a username without a session header
    let body = tool_call(10, "set_username", json!({"username": "alice"})).to_string();
    let (_, _, response) = post_mcp(&app, &body, &[]).await;
    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).contains("mcp-session-id"));

    // Client B, also headerless, finds nothing to log in with
    let body = tool_call(11, "authenticate_with_env_password", json!({})).to_string();
    let (_, _, response) = post_mcp(&app, &body, &[]).await;
    assert_eq!(response["result"]["isError"], true);

    token.assert_async().await;
    assert!(!manager.is_authenticated().await);
}

#[tokio::test]
async fn test_pending_username_is_scoped_to_session_header() {
    let server = mockito::Server::new_async().await;
    let app = create_app(manager(&server), None);

    let body = tool_call(12, "set_username", json!({"username": "alice"})).to_string();
    let (_, _, response) = post_mcp(&app, &body, &[("mcp-session-id", "client-a")]).await;
    assert_eq!(response["result"]["isError"], false);

    let body = tool_call(13, "authenticate_with_password_file", json!({"password_file_path": "/nonexistent/pw"}))
        .to_string();
    let (_, _, response) = post_mcp(&app, &body, &[("mcp-session-id", "client-b")]).await;
    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).contains("set your username first"));
}
