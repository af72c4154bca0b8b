use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::{Client, Method, Request, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::error::RemoteError;
use super::models::{
    Agency, Communication, CreatedRequest, FoiaRequest, Jurisdiction, MessageBody, NewRequest,
    Organization, Page, RequestQuery, User,
};
use super::{RecordsApi, RemoteResult, SessionConnector};
use crate::auth::Credentials;

/// Largest page size the API accepts
const MAX_PAGE_SIZE: usize = 100;

/// Connection settings shared by every handle the connector produces
#[derive(Debug, Clone)]
pub struct HttpConnectorConfig {
    pub api_url: String,
    pub token_url: String,
    pub connect_timeout: u64,
    pub request_timeout: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

/// Token endpoint response
#[derive(Deserialize)]
struct TokenResponse {
    access: String,
    #[serde(default)]
    #[allow(dead_code)]
    refresh: Option<String>,
}

/// Builds records API handles over a shared connection pool
pub struct HttpConnector {
    http: Client,
    config: HttpConnectorConfig,
}

impl HttpConnector {
    pub fn new(config: HttpConnectorConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .timeout(Duration::from_secs(config.request_timeout))
            .user_agent(concat!("muckrock-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { http, config })
    }

    fn handle(&self, token: Option<SecretString>) -> MuckRockHttpClient {
        MuckRockHttpClient {
            http: self.http.clone(),
            api_url: self.config.api_url.trim_end_matches('/').to_string(),
            token,
            max_retries: self.config.max_retries,
            base_delay_ms: self.config.retry_base_delay_ms,
            request_timeout: self.config.request_timeout,
        }
    }

    async fn fetch_token(&self, credentials: &Credentials) -> RemoteResult<SecretString> {
        tracing::info!(username = %credentials.username, "Requesting MuckRock access token");

        let body = serde_json::json!({
            "username": credentials.username,
            "password": credentials.password.expose_secret(),
        });

        let response = self
            .http
            .post(&self.config.token_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(e, self.config.request_timeout))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "MuckRock login rejected");
            // The token endpoint answers bad credentials with 400
            if status.as_u16() == 400 {
                return Err(RemoteError::Authentication {
                    status: 400,
                    message: error_text,
                });
            }
            return Err(RemoteError::from_status(status.as_u16(), &error_text));
        }

        let data: TokenResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("token response: {}", e)))?;

        if data.access.is_empty() {
            return Err(RemoteError::InvalidResponse(
                "token response does not contain an access token".to_string(),
            ));
        }

        Ok(SecretString::new(data.access.into()))
    }
}

impl SessionConnector for HttpConnector {
    fn anonymous(&self) -> Arc<dyn RecordsApi> {
        Arc::new(self.handle(None))
    }

    fn login(
        &self,
        credentials: Arc<Credentials>,
    ) -> BoxFuture<'_, RemoteResult<Arc<dyn RecordsApi>>> {
        Box::pin(async move {
            let token = self.fetch_token(&credentials).await?;
            tracing::info!(username = %credentials.username, "MuckRock login succeeded");
            let handle: Arc<dyn RecordsApi> = Arc::new(self.handle(Some(token)));
            Ok(handle)
        })
    }
}

/// HTTP client for the MuckRock API with transport retries
///
/// Retries 429, 5xx and network failures with exponential backoff.
/// Authentication failures are returned immediately; re-login is the
/// caller's decision.
pub struct MuckRockHttpClient {
    http: Client,
    api_url: String,
    token: Option<SecretString>,
    max_retries: u32,
    base_delay_ms: u64,
    request_timeout: u64,
}

impl MuckRockHttpClient {
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header("Accept", "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Execute a request, retrying transient failures
    async fn execute(&self, request: Request) -> RemoteResult<Response> {
        let mut attempt = 0;
        let method = request.method().clone();
        let url = request.url().clone();

        tracing::debug!(method = %method, url = %url, "Sending MuckRock request");

        loop {
            let req = request.try_clone().ok_or_else(|| {
                RemoteError::Other("Request body is not cloneable".to_string())
            })?;

            match self.http.execute(req).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let code = status.as_u16();
                    if (code == 429 || (500..=599).contains(&code)) && attempt < self.max_retries {
                        let delay = self.calculate_backoff_delay(attempt);
                        tracing::warn!(
                            "Received {}, retrying after {}ms (attempt {}/{})",
                            status,
                            delay,
                            attempt + 1,
                            self.max_retries
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    tracing::warn!(
                        status = code,
                        url = %url,
                        attempt = attempt + 1,
                        "MuckRock request failed"
                    );
                    return Err(RemoteError::from_status(code, &error_text));
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        let delay = self.calculate_backoff_delay(attempt);
                        tracing::warn!(
                            "Request failed: {}, retrying after {}ms (attempt {}/{})",
                            e,
                            delay,
                            attempt + 1,
                            self.max_retries
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }

                    tracing::error!(
                        error = %e,
                        url = %url,
                        total_attempts = attempt + 1,
                        "MuckRock request failed after all retries"
                    );
                    return Err(network_error(e, self.request_timeout));
                }
            }
        }
    }

    /// Exponential backoff: base_delay * 2^attempt, plus up to 10% jitter
    fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let delay = self.base_delay_ms * 2_u64.pow(attempt);
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u64)
            .unwrap_or(0);
        delay + nanos % (delay / 10 + 1)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> RemoteResult<T> {
        let request = self.request(Method::GET, url).query(query).build()?;
        let response = self.execute(request).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    /// Follow `next` links until `limit` items are collected
    async fn collect<T: DeserializeOwned>(
        &self,
        path: &str,
        mut query: Vec<(&str, String)>,
        limit: usize,
    ) -> RemoteResult<Vec<T>> {
        let limit = limit.max(1);
        query.push(("page_size", limit.min(MAX_PAGE_SIZE).to_string()));

        let mut items = Vec::new();
        let mut page: Page<T> = self.get_json(&self.endpoint(path), &query).await?;

        loop {
            items.extend(page.results);
            if items.len() >= limit {
                items.truncate(limit);
                break;
            }
            match page.next {
                Some(next) => page = self.get_json(&next, &[]).await?,
                None => break,
            }
        }

        Ok(items)
    }

    async fn post_json<B: serde::Serialize>(&self, path: &str, body: &B) -> RemoteResult<Response> {
        let request = self
            .request(Method::POST, &self.endpoint(path))
            .json(body)
            .build()?;
        self.execute(request).await
    }
}

fn network_error(e: reqwest::Error, timeout_secs: u64) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout(timeout_secs)
    } else {
        RemoteError::Network(e)
    }
}

impl RecordsApi for MuckRockHttpClient {
    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn list_requests(&self, query: RequestQuery) -> BoxFuture<'_, RemoteResult<Vec<FoiaRequest>>> {
        Box::pin(async move {
            let mut params = Vec::new();
            if let Some(search) = query.search {
                params.push(("search", search));
            }
            if let Some(status) = query.status {
                params.push(("status", status));
            }
            if let Some(user) = query.user {
                params.push(("user", user.to_string()));
            }
            self.collect("requests/", params, query.limit).await
        })
    }

    fn get_request(&self, foia_id: u64) -> BoxFuture<'_, RemoteResult<FoiaRequest>> {
        Box::pin(async move {
            self.get_json(&self.endpoint(&format!("requests/{}/", foia_id)), &[])
                .await
        })
    }

    fn list_communications(
        &self,
        foia_id: u64,
        limit: usize,
    ) -> BoxFuture<'_, RemoteResult<Vec<Communication>>> {
        Box::pin(async move {
            self.collect("communications/", vec![("foia", foia_id.to_string())], limit)
                .await
        })
    }

    fn list_agencies(
        &self,
        search: String,
        limit: usize,
    ) -> BoxFuture<'_, RemoteResult<Vec<Agency>>> {
        Box::pin(async move { self.collect("agencies/", vec![("search", search)], limit).await })
    }

    fn get_agency(&self, agency_id: u64) -> BoxFuture<'_, RemoteResult<Agency>> {
        Box::pin(async move {
            self.get_json(&self.endpoint(&format!("agencies/{}/", agency_id)), &[])
                .await
        })
    }

    fn list_jurisdictions(
        &self,
        search: String,
        limit: usize,
    ) -> BoxFuture<'_, RemoteResult<Vec<Jurisdiction>>> {
        Box::pin(async move {
            self.collect("jurisdictions/", vec![("search", search)], limit)
                .await
        })
    }

    fn me(&self) -> BoxFuture<'_, RemoteResult<User>> {
        Box::pin(async move { self.get_json(&self.endpoint("users/me/"), &[]).await })
    }

    fn list_organizations(&self) -> BoxFuture<'_, RemoteResult<Vec<Organization>>> {
        Box::pin(async move {
            self.collect("organizations/", Vec::new(), MAX_PAGE_SIZE)
                .await
        })
    }

    fn create_request(&self, request: NewRequest) -> BoxFuture<'_, RemoteResult<CreatedRequest>> {
        Box::pin(async move {
            let response = self.post_json("requests/", &request).await?;
            let location_header = response
                .headers()
                .get("location")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let text = response.text().await.map_err(RemoteError::Network)?;
            let mut created: CreatedRequest = if text.trim().is_empty() {
                CreatedRequest::default()
            } else {
                serde_json::from_str(&text)
                    .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?
            };
            if created.location.is_none() {
                created.location = location_header;
            }
            Ok(created)
        })
    }

    fn follow_up(&self, foia_id: u64, message: String) -> BoxFuture<'_, RemoteResult<()>> {
        Box::pin(async move {
            let body = MessageBody {
                communication: message,
            };
            self.post_json(&format!("requests/{}/followup/", foia_id), &body)
                .await?;
            Ok(())
        })
    }

    fn appeal(&self, foia_id: u64, message: String) -> BoxFuture<'_, RemoteResult<()>> {
        Box::pin(async move {
            let body = MessageBody {
                communication: message,
            };
            self.post_json(&format!("requests/{}/appeal/", foia_id), &body)
                .await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn connector(server: &Server) -> HttpConnector {
        HttpConnector::new(HttpConnectorConfig {
            api_url: format!("{}/api_v2/", server.url()),
            token_url: format!("{}/api/token/", server.url()),
            connect_timeout: 5,
            request_timeout: 5,
            max_retries: 2,
            retry_base_delay_ms: 1,
        })
        .unwrap()
    }

    fn credentials() -> Arc<Credentials> {
        Arc::new(Credentials::new("reporter", "hunter2"))
    }

    #[tokio::test]
    async fn test_login_sends_bearer_token() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", "/api/token/")
            .match_body(Matcher::Json(serde_json::json!({
                "username": "reporter",
                "password": "hunter2"
            })))
            .with_status(200)
            .with_body(r#"{"access": "abc123", "refresh": "r"}"#)
            .create_async()
            .await;
        let me = server
            .mock("GET", "/api_v2/users/me/")
            .match_header("authorization", "Bearer abc123")
            .with_status(200)
            .with_body(r#"{"id": 7, "username": "reporter"}"#)
            .create_async()
            .await;

        let connector = connector(&server);
        let client = connector.login(credentials()).await.unwrap();
        assert!(client.is_authenticated());
        let user = client.me().await.unwrap();
        assert_eq!(user.id, 7);

        token.assert_async().await;
        me.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_bad_password_is_authentication_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/token/")
            .with_status(400)
            .with_body(r#"{"detail": "No active account found"}"#)
            .create_async()
            .await;

        let err = connector(&server).login(credentials()).await.err().unwrap();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn test_anonymous_handle_has_no_auth_header() {
        let mut server = Server::new_async().await;
        let list = server
            .mock("GET", "/api_v2/agencies/")
            .match_header("authorization", Matcher::Missing)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("search".into(), "police".into()),
                Matcher::UrlEncoded("page_size".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"count": 3, "next": null, "results": [{"id": 1, "name": "Boston Police"}, {"id": 2, "name": "NYPD"}]}"#)
            .create_async()
            .await;

        let client = connector(&server).anonymous();
        assert!(!client.is_authenticated());
        let agencies = client.list_agencies("police".to_string(), 2).await.unwrap();
        assert_eq!(agencies.len(), 2);
        list.assert_async().await;
    }

    #[tokio::test]
    async fn test_pagination_follows_next_until_limit() {
        let mut server = Server::new_async().await;
        let next = format!("{}/api_v2/requests/?page=2", server.url());
        server
            .mock("GET", "/api_v2/requests/")
            .match_query(Matcher::UrlEncoded("search".into(), "drones".into()))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "next": next,
                    "results": [{"id": 1, "title": "A", "status": "done"}]
                })
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api_v2/requests/")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(r#"{"next": null, "results": [{"id": 2, "title": "B", "status": "ack"}, {"id": 3, "title": "C", "status": "ack"}]}"#)
            .create_async()
            .await;

        let client = connector(&server).anonymous();
        let requests = client
            .list_requests(RequestQuery::search("drones", 2))
            .await
            .unwrap();
        assert_eq!(
            requests.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("GET", "/api_v2/requests/5/")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = connector(&server).anonymous();
        let err = client.get_request(5).await.err().unwrap();
        assert!(matches!(err, RemoteError::Server { status: 503, .. }));
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let mut server = Server::new_async().await;
        let unauthorized = server
            .mock("GET", "/api_v2/users/me/")
            .with_status(401)
            .with_body("token expired")
            .expect(1)
            .create_async()
            .await;

        let client = connector(&server).anonymous();
        let err = client.me().await.err().unwrap();
        assert!(err.is_authentication());
        unauthorized.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_request_reads_location_header() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api_v2/requests/")
            .with_status(201)
            .with_header(
                "location",
                "https://www.muckrock.com/foi/multirequest/police-emails-123456/",
            )
            .with_body("")
            .create_async()
            .await;

        let client = connector(&server).anonymous();
        let created = client
            .create_request(NewRequest {
                title: "Police emails".to_string(),
                requested_docs: "All emails".to_string(),
                agencies: vec![1],
                organization: 9,
                embargo: false,
                permanent_embargo: false,
                request_fee_waiver: true,
            })
            .await
            .unwrap();
        assert_eq!(
            created.location.as_deref(),
            Some("https://www.muckrock.com/foi/multirequest/police-emails-123456/")
        );
    }
}
