// Retry-once-on-authentication-failure wrapper for records API calls

use std::future::Future;
use std::sync::Arc;

use super::manager::AuthManager;
use crate::muckrock::{RecordsApi, RemoteResult};

/// Runs a records API operation and, if it fails with an authentication
/// error, refreshes the session and tries exactly once more.
///
/// Any other failure, or a failure of the retry itself, is returned unchanged.
#[derive(Clone)]
pub struct AuthRetryWrapper {
    manager: AuthManager,
}

impl AuthRetryWrapper {
    pub fn new(manager: AuthManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &AuthManager {
        &self.manager
    }

    pub async fn invoke<T, F, Fut>(&self, op: F) -> RemoteResult<T>
    where
        F: Fn(Arc<dyn RecordsApi>) -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let session = self.manager.checkout().await;
        let generation = session.generation;

        let err = match op(session.client.clone()).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_authentication() {
            return Err(err);
        }

        tracing::warn!("Authentication error, refreshing session and retrying: {}", err);

        if !self.manager.refresh_after_failure(generation).await {
            tracing::error!("Session refresh failed, giving up on retry");
            return Err(err);
        }

        let session = self.manager.current().await;
        op(session.client.clone()).await
    }
}
