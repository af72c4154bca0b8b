use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::types::{
    AuthError, Credentials, Session, SessionSettings, SessionStatus, TestResult, TestStatus,
};
use crate::muckrock::{RecordsApi, RequestQuery, SessionConnector, User};

/// Shown for anonymous sessions
const ANONYMOUS_LIMITATIONS: &str = "Limited functionality - filing requests, appeals, and user-specific operations unavailable";

/// When a serialized refresh should actually log in again
#[derive(Debug, Clone, Copy)]
enum RefreshCondition {
    /// Always log in again
    Always,
    /// Only if the session is still expiring once the lock is held
    StillExpiring,
    /// Only if nobody replaced the session since this generation
    Generation(u64),
}

/// Session lifecycle manager
///
/// Owns the single authoritative [`Session`], refreshes it before its assumed
/// expiry, and degrades to anonymous access when login is impossible. Remote
/// failures are turned into state or status fields, never returned as errors
/// (except from [`AuthManager::switch_user`], which reports them as a value).
///
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct AuthManager {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn SessionConnector>,
    settings: SessionSettings,

    /// Current session, swapped atomically
    session: RwLock<Arc<Session>>,

    /// Serializes every session replacement
    write_lock: Mutex<()>,

    /// Reason the last login or refresh failed
    last_error: RwLock<Option<String>>,

    next_generation: AtomicU64,
}

impl AuthManager {
    /// Create a manager in the anonymous state
    pub fn new(connector: Arc<dyn SessionConnector>, settings: SessionSettings) -> Self {
        let session = Session::anonymous(connector.anonymous(), Utc::now(), 0);

        Self {
            inner: Arc::new(Inner {
                connector,
                settings,
                session: RwLock::new(Arc::new(session)),
                write_lock: Mutex::new(()),
                last_error: RwLock::new(None),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    /// Log in with the given credentials, or go anonymous without them.
    /// A failed login falls back to anonymous access and is recorded for status.
    pub async fn initialize(&self, credentials: Option<Credentials>) {
        self.initialize_at(credentials, Utc::now()).await
    }

    pub async fn initialize_at(&self, credentials: Option<Credentials>, now: DateTime<Utc>) {
        let _guard = self.inner.write_lock.lock().await;

        let Some(credentials) = credentials else {
            tracing::info!("No credentials provided, using anonymous access");
            self.inner.install_anonymous(now).await;
            self.inner.set_last_error(None).await;
            return;
        };

        tracing::info!(
            "Initializing authenticated MuckRock session for user: {}",
            credentials.username
        );
        let owner = Arc::new(credentials);

        match self.inner.login(owner.clone()).await {
            Ok(client) => {
                self.inner.install_authenticated(client, owner, now).await;
                self.inner.set_last_error(None).await;
                tracing::info!("Authentication successful");
            }
            Err(e) => {
                tracing::error!("Failed to initialize authenticated session: {}", e);
                tracing::warn!("Falling back to anonymous access");
                self.inner.install_anonymous(now).await;
                self.inner
                    .set_last_error(Some(format!("Login as {} failed: {}", owner.username, e)))
                    .await;
            }
        }
    }

    /// Snapshot of the current session, with no refresh
    pub async fn current(&self) -> Arc<Session> {
        self.inner.current().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current().await.is_authenticated()
    }

    /// True if an authenticated session is inside the refresh buffer
    pub async fn is_expiring_soon(&self, now: DateTime<Utc>) -> bool {
        self.current()
            .await
            .is_expiring_soon(now, self.inner.settings.refresh_buffer)
    }

    /// Refresh if the session is expiring soon.
    /// Returns whether the resulting session is usable.
    ///
    /// A failed refresh still returns true while the assumed expiry is in the
    /// future; callers keep using the old handle until it actually lapses.
    pub async fn ensure_valid(&self, now: DateTime<Utc>) -> bool {
        let session = self.current().await;

        // Anonymous access has no expiry
        if !session.is_authenticated() {
            return true;
        }

        if !session.is_expiring_soon(now, self.inner.settings.refresh_buffer) {
            return true;
        }

        tracing::info!("Session expired or expiring soon, refreshing...");
        if self.run_refresh(now, RefreshCondition::StillExpiring).await {
            return true;
        }

        // Graceful degradation: keep using the old session until it actually expires
        let session = self.current().await;
        if !session.is_expired(now) {
            tracing::warn!("Using existing session despite refresh failure (not yet expired)");
            return true;
        }
        false
    }

    /// Log in again with the current credentials and replace the session.
    /// On failure the previous session stays in place.
    pub async fn refresh(&self) -> bool {
        self.refresh_at(Utc::now()).await
    }

    pub async fn refresh_at(&self, now: DateTime<Utc>) -> bool {
        self.run_refresh(now, RefreshCondition::Always).await
    }

    /// Forced refresh after a call failed with an authentication error.
    ///
    /// `observed_generation` is the session the failing call used. If the
    /// session has been replaced since, no new login is made.
    pub async fn refresh_after_failure(&self, observed_generation: u64) -> bool {
        self.run_refresh(
            Utc::now(),
            RefreshCondition::Generation(observed_generation),
        )
        .await
    }

    /// Ensure the session is valid, then return a snapshot of it
    pub async fn checkout(&self) -> Arc<Session> {
        self.ensure_valid(Utc::now()).await;
        self.current().await
    }

    /// Get the records API handle, refreshing first if needed.
    /// The handle is returned even if the refresh failed.
    pub async fn get_client(&self) -> Arc<dyn RecordsApi> {
        self.checkout().await.client.clone()
    }

    /// Current status; never refreshes
    pub async fn status(&self, now: DateTime<Utc>) -> SessionStatus {
        let session = self.current().await;
        let last_error = self.inner.last_error.read().await.clone();
        let buffer = self.inner.settings.refresh_buffer;

        let Some(username) = session.username() else {
            let note = match last_error {
                Some(err) => format!("{}. {}", ANONYMOUS_LIMITATIONS, err),
                None => ANONYMOUS_LIMITATIONS.to_string(),
            };
            return SessionStatus {
                authenticated: false,
                access_type: session.access_type(),
                username: None,
                valid: true,
                created_at: session.created_at,
                expires_at: None,
                time_until_expiry: None,
                time_until_refresh: None,
                note,
            };
        };

        let time_until_expiry = session.expires_at.map(|exp| (exp - now).num_seconds());
        let time_until_refresh = session
            .expires_at
            .map(|exp| (exp - buffer - now).num_seconds().max(0));
        let valid = !session.is_expiring_soon(now, buffer);

        let note = match last_error {
            Some(err) => format!("Authenticated as {}. Last refresh attempt failed: {}", username, err),
            None if valid => format!(
                "Authenticated as {}. Session refreshes automatically {} minutes before assumed expiry",
                username,
                buffer.num_minutes()
            ),
            None => format!("Authenticated as {}. Session is due for refresh", username),
        };

        SessionStatus {
            authenticated: true,
            access_type: session.access_type(),
            username: Some(username.to_string()),
            valid,
            created_at: session.created_at,
            expires_at: session.expires_at,
            time_until_expiry,
            time_until_refresh,
            note,
        }
    }

    /// Probe the API with one real call and classify the outcome
    pub async fn test(&self) -> TestResult {
        let session = self.checkout().await;

        if !session.is_authenticated() {
            return TestResult {
                status: TestStatus::Anonymous,
                message: "Using anonymous access - limited functionality".to_string(),
                session: self.status(Utc::now()).await,
            };
        }

        let probe = session.client.list_requests(RequestQuery {
            limit: 1,
            ..Default::default()
        });

        let (status, message) =
            match tokio::time::timeout(self.inner.settings.login_timeout, probe).await {
                Ok(Ok(requests)) => match requests.first() {
                    Some(first) => (
                        TestStatus::Success,
                        format!(
                            "Authentication verified - can access requests (first request #{})",
                            first.id
                        ),
                    ),
                    None => (
                        TestStatus::Success,
                        "Authentication verified - no requests found but access confirmed"
                            .to_string(),
                    ),
                },
                Ok(Err(e)) => (
                    TestStatus::Error,
                    format!("Authentication test failed: {}", e),
                ),
                Err(_) => (
                    TestStatus::Error,
                    format!(
                        "Authentication test failed: no response within {}s",
                        self.inner.settings.login_timeout.as_secs()
                    ),
                ),
            };

        TestResult {
            status,
            message,
            session: self.status(Utc::now()).await,
        }
    }

    /// Log in as a different user, verifying the account before switching.
    /// On failure the previous session is kept.
    pub async fn switch_user(
        &self,
        credentials: Credentials,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        if credentials.username.trim().is_empty() {
            return Err(AuthError::CredentialMissing);
        }

        let _guard = self.inner.write_lock.lock().await;
        let owner = Arc::new(credentials);

        let client = self.inner.login(owner.clone()).await?;

        let user = match tokio::time::timeout(self.inner.settings.login_timeout, client.me()).await
        {
            Ok(Ok(user)) => user,
            Ok(Err(e)) => return Err(AuthError::VerificationFailed(e.to_string())),
            Err(_) => {
                return Err(AuthError::Timeout(
                    self.inner.settings.login_timeout.as_secs(),
                ))
            }
        };

        self.inner.install_authenticated(client, owner, now).await;
        self.inner.set_last_error(None).await;
        tracing::info!("Successfully authenticated as {}", user.username);

        Ok(user)
    }

    /// Drop credentials and switch to anonymous access
    pub async fn logout(&self) {
        let _guard = self.inner.write_lock.lock().await;
        tracing::info!("Logging out and switching to anonymous access");
        self.inner.install_anonymous(Utc::now()).await;
        self.inner.set_last_error(None).await;
    }

    /// Run a serialized refresh on its own task so a cancelled caller
    /// cannot abandon a login halfway through
    async fn run_refresh(&self, now: DateTime<Utc>, condition: RefreshCondition) -> bool {
        let inner = Arc::clone(&self.inner);
        match tokio::spawn(inner.refresh_serialized(now, condition)).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                tracing::error!("Session refresh task failed: {}", e);
                false
            }
        }
    }
}

impl Inner {
    async fn current(&self) -> Arc<Session> {
        self.session.read().await.clone()
    }

    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst)
    }

    async fn set_last_error(&self, error: Option<String>) {
        *self.last_error.write().await = error;
    }

    async fn install_anonymous(&self, now: DateTime<Utc>) {
        let session = Session::anonymous(self.connector.anonymous(), now, self.next_generation());
        *self.session.write().await = Arc::new(session);
    }

    async fn install_authenticated(
        &self,
        client: Arc<dyn RecordsApi>,
        owner: Arc<Credentials>,
        now: DateTime<Utc>,
    ) {
        let session = Session::authenticated(
            client,
            owner,
            now,
            self.settings.token_lifetime,
            self.next_generation(),
        );
        tracing::debug!(
            generation = session.generation,
            expires_at = ?session.expires_at,
            "Installed new session"
        );
        *self.session.write().await = Arc::new(session);
    }

    /// Log in with a bounded wait
    async fn login(&self, owner: Arc<Credentials>) -> Result<Arc<dyn RecordsApi>, AuthError> {
        let timeout = self.settings.login_timeout;
        match tokio::time::timeout(timeout, self.connector.login(owner)).await {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(e)) => Err(AuthError::LoginFailed(e.to_string())),
            Err(_) => Err(AuthError::Timeout(timeout.as_secs())),
        }
    }

    async fn refresh_serialized(
        self: Arc<Self>,
        now: DateTime<Utc>,
        condition: RefreshCondition,
    ) -> bool {
        let _guard = self.write_lock.lock().await;
        let current = self.current().await;

        let Some(owner) = current.owner.clone() else {
            tracing::warn!("Cannot refresh session: no credentials available");
            return false;
        };

        // Another caller may have refreshed while we waited for the lock
        match condition {
            RefreshCondition::Always => {}
            RefreshCondition::StillExpiring => {
                if !current.is_expiring_soon(now, self.settings.refresh_buffer) {
                    tracing::debug!("Session already refreshed by another caller");
                    return true;
                }
            }
            RefreshCondition::Generation(observed) => {
                if current.generation != observed {
                    tracing::debug!(
                        observed,
                        current = current.generation,
                        "Session already replaced since the failing call"
                    );
                    return true;
                }
            }
        }

        tracing::info!("Refreshing MuckRock session for user: {}", owner.username);
        match self.login(owner.clone()).await {
            Ok(client) => {
                self.install_authenticated(client, owner, now).await;
                self.set_last_error(None).await;
                tracing::info!("Session refreshed successfully");
                true
            }
            Err(e) => {
                tracing::error!("Failed to refresh session: {}", e);
                self.set_last_error(Some(e.to_string())).await;
                false
            }
        }
    }
}
