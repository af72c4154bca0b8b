use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self as axum_middleware},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::AuthManager;
use crate::error::ApiError;
use crate::middleware;
use crate::rpc::{RpcHandler, RpcResponse, PARSE_ERROR};
use crate::tools::SHARED_SESSION_KEY;

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Header carrying the MCP session identifier
pub const SESSION_HEADER: &str = "mcp-session-id";


/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub rpc: RpcHandler,
    /// When set, POST /mcp requires this key
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(rpc: RpcHandler, api_key: Option<String>) -> Self {
        Self {
            rpc,
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn manager(&self) -> &AuthManager {
        self.rpc.tools().manager()
    }
}

/// Full HTTP application
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health_routes(state.clone()))
        .merge(mcp_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
}

/// Health check routes (no authentication required)
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// MCP endpoint (optional API key)
pub fn mcp_routes(state: AppState) -> Router {
    Router::new()
        .route("/mcp", post(mcp_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}

/// GET / - Simple health check
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "MuckRock gateway is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check including the session snapshot
///
/// Never triggers a refresh.
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let now = Utc::now();
    let session = state.manager().status(now).await;
    Json(json!({
        "status": "healthy",
        "timestamp": now.to_rfc3339(),
        "version": VERSION,
        "session": session
    }))
}

/// POST /mcp - One JSON-RPC message in, one response out
///
/// Notifications are acknowledged with 202 and no body.
async fn mcp_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, ApiError> {
    let value: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Invalid JSON-RPC body: {}", e);
            let response = RpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {}", e));
            return Ok(Json(response).into_response());
        }
    };

    let is_initialize = value.get("method").and_then(Value::as_str) == Some("initialize");
    let existing = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|v| !v.is_empty());

    let (session_key, assigned) = match existing {
        Some(key) => (key, None),
        None if is_initialize => {
            let key = Uuid::new_v4().to_string();
            tracing::info!("Assigned new MCP session: {}", key);
            (key.clone(), Some(key))
        }
        None => (SHARED_SESSION_KEY.to_string(), None),
    };

    let Some(response) = state.rpc.handle_value(&session_key, value).await else {
        return Ok(StatusCode::ACCEPTED.into_response());
    };

    let mut response = Json(response).into_response();
    if let Some(key) = assigned {
        let header = HeaderValue::from_str(&key)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Invalid session id: {}", e)))?;
        response.headers_mut().insert(SESSION_HEADER, header);
    }

    Ok(response)
}
