// Authentication types

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::muckrock::RecordsApi;

/// Assumed session lifetime; the API does not report real token expiry
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 2 * 60 * 60;

/// Lead time before assumed expiry at which a refresh is triggered
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 10 * 60;

/// Upper bound on a login or probe call
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 30;

/// A username/password pair. Immutable once captured.
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let password: String = password.into();
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    pub fn from_secret(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

/// Whether calls go out with a login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Anonymous,
    Authenticated,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessType::Anonymous => write!(f, "anonymous"),
            AccessType::Authenticated => write!(f, "authenticated"),
        }
    }
}

/// Session timing settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub token_lifetime: Duration,
    pub refresh_buffer: Duration,
    pub login_timeout: std::time::Duration,
}

impl SessionSettings {
    /// Build settings from configured seconds.
    /// Returns None when a value does not fit a signed duration.
    pub fn try_from_secs(token_lifetime: u64, refresh_buffer: u64, login_timeout: u64) -> Option<Self> {
        Some(Self {
            token_lifetime: checked_seconds(token_lifetime)?,
            refresh_buffer: checked_seconds(refresh_buffer)?,
            login_timeout: std::time::Duration::from_secs(login_timeout),
        })
    }
}

fn checked_seconds(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            token_lifetime: Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS),
            refresh_buffer: Duration::seconds(DEFAULT_REFRESH_BUFFER_SECS),
            login_timeout: std::time::Duration::from_secs(DEFAULT_LOGIN_TIMEOUT_SECS),
        }
    }
}

/// One live handle to the records API and who it belongs to.
/// Never mutated; replaced wholesale on login, refresh and logout.
pub struct Session {
    pub client: Arc<dyn RecordsApi>,
    pub owner: Option<Arc<Credentials>>,
    pub created_at: DateTime<Utc>,
    /// Locally assumed expiry; None for anonymous sessions
    pub expires_at: Option<DateTime<Utc>>,
    /// Increases with every replacement
    pub generation: u64,
}

impl Session {
    pub fn anonymous(client: Arc<dyn RecordsApi>, now: DateTime<Utc>, generation: u64) -> Self {
        Self {
            client,
            owner: None,
            created_at: now,
            expires_at: None,
            generation,
        }
    }

    pub fn authenticated(
        client: Arc<dyn RecordsApi>,
        owner: Arc<Credentials>,
        now: DateTime<Utc>,
        lifetime: Duration,
        generation: u64,
    ) -> Self {
        Self {
            client,
            owner: Some(owner),
            created_at: now,
            expires_at: Some(now + lifetime),
            generation,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.owner.is_some()
    }

    pub fn access_type(&self) -> AccessType {
        if self.is_authenticated() {
            AccessType::Authenticated
        } else {
            AccessType::Anonymous
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.owner.as_ref().map(|c| c.username.as_str())
    }

    /// True when `now` is inside the refresh buffer before expiry.
    /// Anonymous sessions never expire.
    pub fn is_expiring_soon(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        match (&self.owner, self.expires_at) {
            (Some(_), Some(expires_at)) => now >= expires_at - buffer,
            _ => false,
        }
    }

    /// True once the assumed lifetime has fully elapsed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (&self.owner, self.expires_at) {
            (Some(_), Some(expires_at)) => now >= expires_at,
            _ => false,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username())
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Read-only snapshot of the session, computed on demand
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub access_type: AccessType,
    pub username: Option<String>,
    pub valid: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Seconds until assumed expiry, if any
    pub time_until_expiry: Option<i64>,
    /// Seconds until the next proactive refresh, if any
    pub time_until_refresh: Option<i64>,
    pub note: String,
}

/// Outcome category of an authentication probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Success,
    Anonymous,
    Error,
}

/// Result of `AuthManager::test`
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub status: TestStatus,
    pub message: String,
    pub session: SessionStatus,
}

/// Login outcomes surfaced as values, never raised to tool callers
#[derive(Error, Debug)]
pub enum AuthError {
    /// No usable credentials
    #[error("No credentials available")]
    CredentialMissing,

    /// Remote rejected or could not process the login
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// Login did not finish in time
    #[error("Login timed out after {0}s")]
    Timeout(u64),

    /// Login succeeded but the account could not be read back
    #[error("Could not verify account: {0}")]
    VerificationFailed(String),
}
