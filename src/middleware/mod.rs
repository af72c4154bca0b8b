// Gateway API key and CORS middleware

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use tower_http::cors::{Any, CorsLayer};

use crate::error::ApiError;
use crate::routes::AppState;

/// Authentication middleware
///
/// When a gateway API key is configured, requires it in the Authorization
/// header ("Bearer {GATEWAY_API_KEY}") or the x-api-key header.
/// Without a configured key every request passes.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected_key) = state.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    if let Some(auth_str) = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
    {
        if auth_str.strip_prefix("Bearer ") == Some(expected_key) {
            return Ok(next.run(request).await);
        }
    }

    if let Some(key_str) = request
        .headers()
        .get("x-api-key")
        .and_then(|h| h.to_str().ok())
    {
        if key_str == expected_key {
            return Ok(next.run(request).await);
        }
    }

    let path = request.uri().path();
    let method = request.method();
    let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
    tracing::warn!(
        "[{}] Access attempt with invalid or missing API key: {} {}",
        request_id,
        method,
        path
    );
    Err(ApiError::AuthError("Invalid or missing API Key".to_string()))
}

/// Create CORS middleware layer
///
/// Allows all origins, methods, and headers, and exposes the MCP session
/// header so browser clients can read it.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([axum::http::HeaderName::from_static(
            crate::routes::SESSION_HEADER,
        )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::FakeConnector;
    use crate::auth::{AuthManager, PendingLogins, SessionSettings};
    use crate::rpc::RpcHandler;
    use crate::tools::ToolRegistry;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use tower::util::ServiceExt;

    fn create_test_state(api_key: Option<&str>) -> AppState {
        let manager = AuthManager::new(FakeConnector::new(), SessionSettings::default());
        let tools = ToolRegistry::new(manager, PendingLogins::new(chrono::Duration::minutes(10)));
        AppState::new(RpcHandler::new(tools), api_key.map(str::to_string))
    }

    async fn test_handler() -> &'static str {
        "OK"
    }

    fn create_test_app(state: AppState) -> Router {
        Router::new()
            .route("/test", get(test_handler))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            ))
            .with_state(state)
    }

    async fn status_for(api_key: Option<&str>, header: Option<(&str, &str)>) -> StatusCode {
        let app = create_test_app(create_test_state(api_key));
        let mut builder = Request::builder().uri("/test");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        response.status()
    }

    #[tokio::test]
    async fn test_auth_middleware_with_valid_bearer_token() {
        let status = status_for(
            Some("test-key-123"),
            Some(("authorization", "Bearer test-key-123")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auth_middleware_with_valid_x_api_key() {
        let status = status_for(Some("test-key-123"), Some(("x-api-key", "test-key-123"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auth_middleware_with_invalid_keys() {
        let status = status_for(
            Some("test-key-123"),
            Some(("authorization", "Bearer wrong-key")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let status = status_for(Some("test-key-123"), Some(("x-api-key", "wrong-key"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_middleware_with_missing_auth() {
        let status = status_for(Some("test-key-123"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_middleware_bearer_without_prefix() {
        let status = status_for(
            Some("test-key-123"),
            Some(("authorization", "test-key-123")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_middleware_open_without_configured_key() {
        assert_eq!(status_for(None, None).await, StatusCode::OK);
        // Empty key counts as unset
        assert_eq!(status_for(Some(""), None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_layer_handles_preflight_options() {
        let app = Router::new()
            .route("/test", get(test_handler))
            .layer(cors_layer());

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/test")
            .header("origin", "https://example.com")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        assert!(response
            .headers()
            .contains_key("access-control-allow-methods"));
    }

    #[tokio::test]
    async fn test_cors_layer_exposes_session_header() {
        let app = Router::new()
            .route("/test", get(test_handler))
            .layer(cors_layer());

        let request = Request::builder()
            .uri("/test")
            .header("origin", "http://localhost:3000")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let exposed = response
            .headers()
            .get("access-control-expose-headers")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(exposed.contains("mcp-session-id"));
    }
}
