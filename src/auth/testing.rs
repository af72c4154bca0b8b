// Scripted records API and connector for exercising the session lifecycle

use futures::future::BoxFuture;
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::Credentials;
use crate::muckrock::{
    Agency, Communication, CreatedRequest, FoiaRequest, Jurisdiction, NewRequest, Organization,
    RecordsApi, RemoteError, RemoteResult, RequestQuery, SessionConnector, User,
};

/// Password the fake connector always rejects
pub const WRONG_PASSWORD: &str = "wrong-password";

/// Records API handle whose `me()` reports which login produced it
pub struct FakeApi {
    pub session_id: u64,
    authenticated: bool,
    failing: bool,
}

impl FakeApi {
    pub fn anonymous() -> Arc<dyn RecordsApi> {
        Arc::new(Self {
            session_id: 0,
            authenticated: false,
            failing: false,
        })
    }

    pub fn authenticated(session_id: u64) -> Arc<dyn RecordsApi> {
        Arc::new(Self {
            session_id,
            authenticated: true,
            failing: false,
        })
    }

    fn guard(&self) -> RemoteResult<()> {
        if self.failing {
            return Err(RemoteError::Server {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn require_login(&self) -> RemoteResult<()> {
        if self.authenticated {
            Ok(())
        } else {
            Err(RemoteError::Authentication {
                status: 401,
                message: "Authentication credentials were not provided.".to_string(),
            })
        }
    }
}

impl RecordsApi for FakeApi {
    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn list_requests(&self, query: RequestQuery) -> BoxFuture<'_, RemoteResult<Vec<FoiaRequest>>> {
        Box::pin(async move {
            self.guard()?;
            let request = FoiaRequest {
                id: 100 + self.session_id,
                title: format!("Request from session {}", self.session_id),
                status: "ack".to_string(),
                ..Default::default()
            };
            Ok(std::iter::repeat(request).take(query.limit.min(1)).collect())
        })
    }

    fn get_request(&self, foia_id: u64) -> BoxFuture<'_, RemoteResult<FoiaRequest>> {
        Box::pin(async move {
            self.guard()?;
            Ok(FoiaRequest {
                id: foia_id,
                title: "Fake request".to_string(),
                status: "done".to_string(),
                ..Default::default()
            })
        })
    }

    fn list_communications(
        &self,
        _foia_id: u64,
        _limit: usize,
    ) -> BoxFuture<'_, RemoteResult<Vec<Communication>>> {
        Box::pin(async move {
            self.guard()?;
            Ok(Vec::new())
        })
    }

    fn list_agencies(
        &self,
        _search: String,
        _limit: usize,
    ) -> BoxFuture<'_, RemoteResult<Vec<Agency>>> {
        Box::pin(async move {
            self.guard()?;
            Ok(Vec::new())
        })
    }

    fn get_agency(&self, agency_id: u64) -> BoxFuture<'_, RemoteResult<Agency>> {
        Box::pin(async move {
            self.guard()?;
            Ok(Agency {
                id: agency_id,
                name: "Fake agency".to_string(),
                ..Default::default()
            })
        })
    }

    fn list_jurisdictions(
        &self,
        _search: String,
        _limit: usize,
    ) -> BoxFuture<'_, RemoteResult<Vec<Jurisdiction>>> {
        Box::pin(async move {
            self.guard()?;
            Ok(Vec::new())
        })
    }

    fn me(&self) -> BoxFuture<'_, RemoteResult<User>> {
        Box::pin(async move {
            self.guard()?;
            self.require_login()?;
            Ok(User {
                id: self.session_id,
                username: format!("user-{}", self.session_id),
                ..Default::default()
            })
        })
    }

    fn list_organizations(&self) -> BoxFuture<'_, RemoteResult<Vec<Organization>>> {
        Box::pin(async move {
            self.guard()?;
            self.require_login()?;
            Ok(Vec::new())
        })
    }

    fn create_request(&self, _request: NewRequest) -> BoxFuture<'_, RemoteResult<CreatedRequest>> {
        Box::pin(async move {
            self.guard()?;
            self.require_login()?;
            Ok(CreatedRequest::default())
        })
    }

    fn follow_up(&self, _foia_id: u64, _message: String) -> BoxFuture<'_, RemoteResult<()>> {
        Box::pin(async move {
            self.guard()?;
            self.require_login()
        })
    }

    fn appeal(&self, _foia_id: u64, _message: String) -> BoxFuture<'_, RemoteResult<()>> {
        Box::pin(async move {
            self.guard()?;
            self.require_login()
        })
    }
}

/// Connector that counts login attempts and fails on demand
pub struct FakeConnector {
    logins: AtomicUsize,
    reject_logins: AtomicBool,
    failing_handles: AtomicBool,
    login_delay: Mutex<Duration>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            logins: AtomicUsize::new(0),
            reject_logins: AtomicBool::new(false),
            failing_handles: AtomicBool::new(false),
            login_delay: Mutex::new(Duration::ZERO),
        })
    }

    /// Number of login attempts so far
    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn reject_logins(&self, reject: bool) {
        self.reject_logins.store(reject, Ordering::SeqCst);
    }

    /// Handles created from now on fail every call with a 503
    pub fn failing_handles(&self, failing: bool) {
        self.failing_handles.store(failing, Ordering::SeqCst);
    }

    pub fn set_login_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.login_delay.lock() {
            *d = delay;
        }
    }

    fn delay(&self) -> Duration {
        self.login_delay.lock().map(|d| *d).unwrap_or(Duration::ZERO)
    }
}

impl SessionConnector for FakeConnector {
    fn anonymous(&self) -> Arc<dyn RecordsApi> {
        Arc::new(FakeApi {
            session_id: 0,
            authenticated: false,
            failing: self.failing_handles.load(Ordering::SeqCst),
        })
    }

    fn login(
        &self,
        credentials: Arc<Credentials>,
    ) -> BoxFuture<'_, RemoteResult<Arc<dyn RecordsApi>>> {
        Box::pin(async move {
            let session_id = self.logins.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            let delay = self.delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if self.reject_logins.load(Ordering::SeqCst)
                || credentials.password.expose_secret() == WRONG_PASSWORD
            {
                return Err(RemoteError::Authentication {
                    status: 401,
                    message: "No active account found with the given credentials".to_string(),
                });
            }

            let handle: Arc<dyn RecordsApi> = Arc::new(FakeApi {
                session_id,
                authenticated: true,
                failing: self.failing_handles.load(Ordering::SeqCst),
            });
            Ok(handle)
        })
    }
}
