// MuckRock records API
// The remote service is reached only through these two traits

mod client;
mod error;
mod models;

use futures::future::BoxFuture;
use std::sync::Arc;

use crate::auth::Credentials;

pub use client::{HttpConnector, HttpConnectorConfig, MuckRockHttpClient};
pub use error::{has_auth_marker, ErrorClass, RemoteError};
pub use models::{
    Agency, Communication, CreatedRequest, FileAttachment, FoiaRequest, Jurisdiction,
    MessageBody, NewRequest, Organization, Page, RequestQuery, User,
};

pub type RemoteResult<T> = Result<T, RemoteError>;

/// A live handle to the records API, anonymous or logged in
pub trait RecordsApi: Send + Sync {
    /// Whether this handle carries a login
    fn is_authenticated(&self) -> bool;

    fn list_requests(&self, query: RequestQuery) -> BoxFuture<'_, RemoteResult<Vec<FoiaRequest>>>;

    fn get_request(&self, foia_id: u64) -> BoxFuture<'_, RemoteResult<FoiaRequest>>;

    fn list_communications(
        &self,
        foia_id: u64,
        limit: usize,
    ) -> BoxFuture<'_, RemoteResult<Vec<Communication>>>;

    fn list_agencies(
        &self,
        search: String,
        limit: usize,
    ) -> BoxFuture<'_, RemoteResult<Vec<Agency>>>;

    fn get_agency(&self, agency_id: u64) -> BoxFuture<'_, RemoteResult<Agency>>;

    fn list_jurisdictions(
        &self,
        search: String,
        limit: usize,
    ) -> BoxFuture<'_, RemoteResult<Vec<Jurisdiction>>>;

    /// The user behind the login
    fn me(&self) -> BoxFuture<'_, RemoteResult<User>>;

    fn list_organizations(&self) -> BoxFuture<'_, RemoteResult<Vec<Organization>>>;

    fn create_request(&self, request: NewRequest) -> BoxFuture<'_, RemoteResult<CreatedRequest>>;

    fn follow_up(&self, foia_id: u64, message: String) -> BoxFuture<'_, RemoteResult<()>>;

    fn appeal(&self, foia_id: u64, message: String) -> BoxFuture<'_, RemoteResult<()>>;
}

/// Produces records API handles
///
/// Logging in is constructing a new handle; there is no separate handshake,
/// so a fresh handle and a refreshed one are indistinguishable.
pub trait SessionConnector: Send + Sync {
    /// A handle with no login
    fn anonymous(&self) -> Arc<dyn RecordsApi>;

    /// Log in and return a handle bound to the new session
    fn login(&self, credentials: Arc<Credentials>)
        -> BoxFuture<'_, RemoteResult<Arc<dyn RecordsApi>>>;
}
