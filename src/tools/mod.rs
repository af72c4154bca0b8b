// Tool registry: MCP tool definitions and handlers over the records API

pub mod format;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::auth::{
    read_password_file, AuthManager, AuthRetryWrapper, Credentials, PendingLogins, TestStatus,
    PASSWORD_ENV,
};
use crate::muckrock::{FoiaRequest, NewRequest, Organization, RemoteError, RequestQuery, User};
use format::FiledRequest;

/// Upper bound on any list a tool returns
const MAX_LIMIT: usize = 100;

/// Request statuses that can be appealed
const APPEALABLE_STATUSES: &[&str] = &["rejected", "partial", "no_docs"];

const AUTH_REQUIRED: &str = "Authentication required: this tool needs a logged-in MuckRock account. \
Use `authenticate`, or `set_username` followed by `authenticate_with_env_password` or `authenticate_with_password_file`.";

/// Session key for HTTP callers that sent no `mcp-session-id`.
/// Every such caller shares it, so it cannot hold a pending username.
pub const SHARED_SESSION_KEY: &str = "http";

const SESSION_REQUIRED: &str = "This login flow needs its own MCP session. \
Send `initialize` first and pass the returned mcp-session-id header on every request, \
or use `authenticate(username, password)` instead.";

/// Text result of one tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// Failures that happen before a tool runs
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: &'static str, message: String },
}

/// Tool advertised through `tools/list`
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    Authenticate,
    SetUsername,
    AuthenticateWithEnvPassword,
    AuthenticateWithPasswordFile,
    CheckAuthStatus,
    TestAuthentication,
    RefreshAuthentication,
    Logout,
    SearchFoiaRequests,
    GetFoiaDetails,
    GetRequestCommunications,
    ListRequestFiles,
    SearchAgencies,
    GetAgencyDetails,
    SearchJurisdictions,
    GetMyUserInfo,
    GetMyOrganizations,
    GetMyRequests,
    FileFoiaRequest,
    FollowUpOnRequest,
    AppealRequest,
}

impl ToolName {
    pub const ALL: [ToolName; 21] = [
        ToolName::Authenticate,
        ToolName::SetUsername,
        ToolName::AuthenticateWithEnvPassword,
        ToolName::AuthenticateWithPasswordFile,
        ToolName::CheckAuthStatus,
        ToolName::TestAuthentication,
        ToolName::RefreshAuthentication,
        ToolName::Logout,
        ToolName::SearchFoiaRequests,
        ToolName::GetFoiaDetails,
        ToolName::GetRequestCommunications,
        ToolName::ListRequestFiles,
        ToolName::SearchAgencies,
        ToolName::GetAgencyDetails,
        ToolName::SearchJurisdictions,
        ToolName::GetMyUserInfo,
        ToolName::GetMyOrganizations,
        ToolName::GetMyRequests,
        ToolName::FileFoiaRequest,
        ToolName::FollowUpOnRequest,
        ToolName::AppealRequest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::Authenticate => "authenticate",
            ToolName::SetUsername => "set_username",
            ToolName::AuthenticateWithEnvPassword => "authenticate_with_env_password",
            ToolName::AuthenticateWithPasswordFile => "authenticate_with_password_file",
            ToolName::CheckAuthStatus => "check_auth_status",
            ToolName::TestAuthentication => "test_authentication",
            ToolName::RefreshAuthentication => "refresh_authentication",
            ToolName::Logout => "logout",
            ToolName::SearchFoiaRequests => "search_foia_requests",
            ToolName::GetFoiaDetails => "get_foia_details",
            ToolName::GetRequestCommunications => "get_request_communications",
            ToolName::ListRequestFiles => "list_request_files",
            ToolName::SearchAgencies => "search_agencies",
            ToolName::GetAgencyDetails => "get_agency_details",
            ToolName::SearchJurisdictions => "search_jurisdictions",
            ToolName::GetMyUserInfo => "get_my_user_info",
            ToolName::GetMyOrganizations => "get_my_organizations",
            ToolName::GetMyRequests => "get_my_requests",
            ToolName::FileFoiaRequest => "file_foia_request",
            ToolName::FollowUpOnRequest => "follow_up_on_request",
            ToolName::AppealRequest => "appeal_request",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    /// Whether the tool reads or writes the caller's pending username
    pub fn uses_pending_login(self) -> bool {
        matches!(
            self,
            ToolName::SetUsername
                | ToolName::AuthenticateWithEnvPassword
                | ToolName::AuthenticateWithPasswordFile
        )
    }

    /// Whether the tool refuses anonymous callers
    pub fn requires_auth(self) -> bool {
        matches!(
            self,
            ToolName::GetMyUserInfo
                | ToolName::GetMyOrganizations
                | ToolName::GetMyRequests
                | ToolName::FileFoiaRequest
                | ToolName::FollowUpOnRequest
                | ToolName::AppealRequest
        )
    }

    fn description(self) -> &'static str {
        match self {
            ToolName::Authenticate => "Authenticate with MuckRock using your username and password.",
            ToolName::SetUsername => "Set your MuckRock username (step 1 of 2 for authentication).",
            ToolName::AuthenticateWithEnvPassword => "Authenticate using the username you set and the password from the MUCKROCK_PASSWORD environment variable.",
            ToolName::AuthenticateWithPasswordFile => "Authenticate using the username you set and a password read from a file.",
            ToolName::CheckAuthStatus => "Check current authentication status and session timing.",
            ToolName::TestAuthentication => "Verify the current session with a live API call.",
            ToolName::RefreshAuthentication => "Force a new login with the current credentials.",
            ToolName::Logout => "Log out and continue with anonymous access.",
            ToolName::SearchFoiaRequests => "Search for FOIA requests on MuckRock by keyword.",
            ToolName::GetFoiaDetails => "Get detailed information about a specific FOIA request.",
            ToolName::GetRequestCommunications => "Get the communications for a specific FOIA request.",
            ToolName::ListRequestFiles => "List files attached to a FOIA request's communications.",
            ToolName::SearchAgencies => "Search for government agencies on MuckRock.",
            ToolName::GetAgencyDetails => "Get detailed information about a specific agency, including performance metrics.",
            ToolName::SearchJurisdictions => "Search for jurisdictions on MuckRock.",
            ToolName::GetMyUserInfo => "Get current user information including organizations.",
            ToolName::GetMyOrganizations => "Get all organizations the current user belongs to.",
            ToolName::GetMyRequests => "Get your own FOIA requests, optionally filtered by status.",
            ToolName::FileFoiaRequest => "File a new FOIA request with automatic organization selection.",
            ToolName::FollowUpOnRequest => "Send a follow-up message on an existing FOIA request.",
            ToolName::AppealRequest => "Appeal a rejected, partially granted or no-documents FOIA request.",
        }
    }

    fn input_schema(self) -> Value {
        let id = |desc: &str| json!({"type": "integer", "minimum": 1, "description": desc});
        let text = |desc: &str| json!({"type": "string", "description": desc});
        let limit = |default: usize| {
            json!({"type": "integer", "minimum": 1, "maximum": MAX_LIMIT, "default": default,
                   "description": "Maximum number of results to return"})
        };

        let (properties, required): (Value, Vec<&str>) = match self {
            ToolName::Authenticate => (
                json!({"username": text("Your MuckRock username"),
                       "password": text("Your MuckRock password")}),
                vec!["username", "password"],
            ),
            ToolName::SetUsername => (
                json!({"username": text("Your MuckRock username")}),
                vec!["username"],
            ),
            ToolName::AuthenticateWithPasswordFile => (
                json!({"password_file_path": text("Path to a file containing your password")}),
                vec!["password_file_path"],
            ),
            ToolName::AuthenticateWithEnvPassword
            | ToolName::CheckAuthStatus
            | ToolName::TestAuthentication
            | ToolName::RefreshAuthentication
            | ToolName::Logout
            | ToolName::GetMyUserInfo
            | ToolName::GetMyOrganizations => (json!({}), vec![]),
            ToolName::SearchFoiaRequests => (
                json!({"query": text("Search keywords"), "limit": limit(10)}),
                vec!["query"],
            ),
            ToolName::GetFoiaDetails | ToolName::ListRequestFiles => (
                json!({"foia_id": id("The ID of the FOIA request")}),
                vec!["foia_id"],
            ),
            ToolName::GetRequestCommunications => (
                json!({"foia_id": id("The ID of the FOIA request"), "limit": limit(10)}),
                vec!["foia_id"],
            ),
            ToolName::SearchAgencies | ToolName::SearchJurisdictions => (
                json!({"query": text("Search keywords"), "limit": limit(10)}),
                vec!["query"],
            ),
            ToolName::GetAgencyDetails => (
                json!({"agency_id": id("The ID of the agency")}),
                vec!["agency_id"],
            ),
            ToolName::GetMyRequests => (
                json!({"status": text("Filter by status, e.g. done, rejected, partial, submitted, ack, processed, appealing, fix, payment, abandoned"),
                       "limit": limit(20)}),
                vec![],
            ),
            ToolName::FileFoiaRequest => (
                json!({
                    "title": text("Title of the FOIA request"),
                    "requested_docs": text("Description of the documents being requested"),
                    "agency_ids": {"type": "array", "items": {"type": "integer"}, "minItems": 1,
                                   "description": "Agency IDs to send the request to"},
                    "organization_name": text("Organization to file under, matched by name"),
                    "embargo": {"type": "boolean", "default": false},
                    "permanent_embargo": {"type": "boolean", "default": false},
                    "request_fee_waiver": {"type": "boolean", "default": true}
                }),
                vec!["title", "requested_docs", "agency_ids"],
            ),
            ToolName::FollowUpOnRequest => (
                json!({"foia_id": id("The ID of the FOIA request"),
                       "message": text("The follow-up message to send")}),
                vec!["foia_id", "message"],
            ),
            ToolName::AppealRequest => (
                json!({"foia_id": id("The ID of the FOIA request to appeal"),
                       "appeal_message": text("Why the decision should be reconsidered")}),
                vec!["foia_id", "appeal_message"],
            ),
        };

        json!({"type": "object", "properties": properties, "required": required})
    }

    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.as_str(),
            description: self.description(),
            input_schema: self.input_schema(),
        }
    }
}

// === Arguments ===

#[derive(Deserialize)]
struct AuthenticateArgs {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct UsernameArgs {
    username: String,
}

#[derive(Deserialize)]
struct PasswordFileArgs {
    password_file_path: String,
}

fn default_limit() -> usize {
    10
}

fn default_my_limit() -> usize {
    20
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

#[derive(Deserialize)]
struct FoiaIdArgs {
    foia_id: u64,
}

#[derive(Deserialize)]
struct CommunicationsArgs {
    foia_id: u64,
    #[serde(default = "default_limit")]
    limit: usize,
}

#[derive(Deserialize)]
struct AgencyIdArgs {
    agency_id: u64,
}

#[derive(Deserialize)]
struct MyRequestsArgs {
    #[serde(default)]
    status: Option<String>,
    #[serde(default = "default_my_limit")]
    limit: usize,
}

#[derive(Deserialize)]
struct FileRequestArgs {
    title: String,
    requested_docs: String,
    agency_ids: Vec<u64>,
    #[serde(default)]
    organization_name: Option<String>,
    #[serde(default)]
    embargo: bool,
    #[serde(default)]
    permanent_embargo: bool,
    #[serde(default = "default_true")]
    request_fee_waiver: bool,
}

#[derive(Deserialize)]
struct FollowUpArgs {
    foia_id: u64,
    message: String,
}

#[derive(Deserialize)]
struct AppealArgs {
    foia_id: u64,
    appeal_message: String,
}

fn decode<T: for<'de> Deserialize<'de>>(tool: ToolName, args: Value) -> Result<T, ToolError> {
    // Clients may send null or omit arguments for parameterless tools
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: tool.as_str(),
        message: e.to_string(),
    })
}

fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_LIMIT)
}

/// Pull a request id out of a request URL like `/foi/city-123/`
pub fn parse_request_id(url: &str) -> Option<u64> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-(\d+)/?$").ok())
        .as_ref()?
        .captures(url)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

// === Registry ===

/// Dispatches tool calls to their handlers
#[derive(Clone)]
pub struct ToolRegistry {
    retry: AuthRetryWrapper,
    pending: Arc<PendingLogins>,
    password_env: String,
}

impl ToolRegistry {
    pub fn new(manager: AuthManager, pending: PendingLogins) -> Self {
        Self {
            retry: AuthRetryWrapper::new(manager),
            pending: Arc::new(pending),
            password_env: PASSWORD_ENV.to_string(),
        }
    }

    /// Read the deferred-login password from a different variable
    pub fn with_password_env(mut self, name: impl Into<String>) -> Self {
        self.password_env = name.into();
        self
    }

    pub fn manager(&self) -> &AuthManager {
        self.retry.manager()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        ToolName::ALL.iter().map(|t| t.definition()).collect()
    }

    /// Run a tool. Never fails: every problem becomes an error result.
    pub async fn call(&self, session_key: &str, name: &str, args: Value) -> ToolOutput {
        tracing::debug!(tool = name, session = session_key, "Tool call");
        match self.dispatch(session_key, name, args).await {
            Ok(output) => {
                if output.is_error {
                    tracing::warn!(tool = name, "Tool returned an error result");
                }
                output
            }
            Err(e) => {
                tracing::warn!(tool = name, "Tool call rejected: {}", e);
                ToolOutput::error(e.to_string())
            }
        }
    }

    async fn dispatch(
        &self,
        session_key: &str,
        name: &str,
        args: Value,
    ) -> Result<ToolOutput, ToolError> {
        let tool = ToolName::parse(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        if tool.uses_pending_login() && session_key == SHARED_SESSION_KEY {
            return Ok(ToolOutput::error(SESSION_REQUIRED));
        }

        if tool.requires_auth() && !self.manager().is_authenticated().await {
            return Ok(ToolOutput::error(AUTH_REQUIRED));
        }

        let output = match tool {
            ToolName::Authenticate => {
                let args: AuthenticateArgs = decode(tool, args)?;
                self.authenticate(Credentials::new(args.username, args.password), None)
                    .await
            }
            ToolName::SetUsername => {
                let args: UsernameArgs = decode(tool, args)?;
                self.set_username(session_key, &args.username)
            }
            ToolName::AuthenticateWithEnvPassword => self.authenticate_with_env(session_key).await,
            ToolName::AuthenticateWithPasswordFile => {
                let args: PasswordFileArgs = decode(tool, args)?;
                self.authenticate_with_file(session_key, &args.password_file_path)
                    .await
            }
            ToolName::CheckAuthStatus => {
                ToolOutput::ok(format::session_status(&self.manager().status(Utc::now()).await))
            }
            ToolName::TestAuthentication => {
                let result = self.manager().test().await;
                let text = format::test_result(&result);
                if result.status == TestStatus::Error {
                    ToolOutput::error(text)
                } else {
                    ToolOutput::ok(text)
                }
            }
            ToolName::RefreshAuthentication => self.refresh().await,
            ToolName::Logout => {
                self.manager().logout().await;
                self.pending.take(session_key, Utc::now());
                ToolOutput::ok("Logged out. Continuing with anonymous access.")
            }
            ToolName::SearchFoiaRequests => {
                let args: SearchArgs = decode(tool, args)?;
                self.search_requests(args).await
            }
            ToolName::GetFoiaDetails => {
                let args: FoiaIdArgs = decode(tool, args)?;
                self.foia_details(args.foia_id).await
            }
            ToolName::GetRequestCommunications => {
                let args: CommunicationsArgs = decode(tool, args)?;
                self.request_communications(args.foia_id, clamp_limit(args.limit))
                    .await
            }
            ToolName::ListRequestFiles => {
                let args: FoiaIdArgs = decode(tool, args)?;
                self.request_files(args.foia_id).await
            }
            ToolName::SearchAgencies => {
                let args: SearchArgs = decode(tool, args)?;
                self.search_agencies(args).await
            }
            ToolName::GetAgencyDetails => {
                let args: AgencyIdArgs = decode(tool, args)?;
                self.agency_details(args.agency_id).await
            }
            ToolName::SearchJurisdictions => {
                let args: SearchArgs = decode(tool, args)?;
                self.search_jurisdictions(args).await
            }
            ToolName::GetMyUserInfo => self.my_user_info().await,
            ToolName::GetMyOrganizations => match self.organizations().await {
                Ok(orgs) => ToolOutput::ok(format::organizations(&orgs)),
                Err(e) => ToolOutput::error(format!("Error getting organizations: {}", e)),
            },
            ToolName::GetMyRequests => {
                let args: MyRequestsArgs = decode(tool, args)?;
                self.my_requests(args).await
            }
            ToolName::FileFoiaRequest => {
                let args: FileRequestArgs = decode(tool, args)?;
                self.file_request(args).await
            }
            ToolName::FollowUpOnRequest => {
                let args: FollowUpArgs = decode(tool, args)?;
                self.follow_up(args).await
            }
            ToolName::AppealRequest => {
                let args: AppealArgs = decode(tool, args)?;
                self.appeal(args).await
            }
        };

        Ok(output)
    }

    // --- authentication tools ---

    async fn authenticate(&self, credentials: Credentials, source: Option<&str>) -> ToolOutput {
        let username = credentials.username.clone();
        match self.manager().switch_user(credentials, Utc::now()).await {
            Ok(user) => {
                // Organizations are a courtesy; a failure here does not undo the login
                let orgs = self.organizations().await.unwrap_or_default();
                ToolOutput::ok(format::authenticated(&user, &orgs, source))
            }
            Err(e) => {
                tracing::warn!("Interactive login as {} failed: {}", username, e);
                ToolOutput::error(format!(
                    "Authentication failed: {}\n\nCheck your username and password. \
                     The account may also need email verification.",
                    e
                ))
            }
        }
    }

    fn set_username(&self, session_key: &str, username: &str) -> ToolOutput {
        let username = username.trim();
        if username.is_empty() {
            return ToolOutput::error("Username cannot be empty");
        }

        self.pending.set_username(session_key, username, Utc::now());
        ToolOutput::ok(format!(
            "Username set: {}\n\nNow provide your password with one of:\n\
             - `authenticate_with_env_password()` reads it from the {} environment variable\n\
             - `authenticate_with_password_file(password_file_path)` reads it from a file\n\
             - `authenticate(username, password)` takes it directly\n\n\
             The username is kept for {} minutes.",
            username,
            self.password_env,
            self.pending.ttl().num_minutes()
        ))
    }

    async fn authenticate_with_env(&self, session_key: &str) -> ToolOutput {
        if self.pending.peek(session_key, Utc::now()).is_none() {
            return ToolOutput::error("Please set your username first using the 'set_username' tool");
        }

        let password = match std::env::var(&self.password_env) {
            Ok(p) if !p.is_empty() => p,
            _ => {
                return ToolOutput::error(format!(
                    "No password found in the {} environment variable. \
                     Set it before starting the server, or use authenticate_with_password_file.",
                    self.password_env
                ))
            }
        };

        let Some(username) = self.pending.take(session_key, Utc::now()) else {
            return ToolOutput::error("Please set your username first using the 'set_username' tool");
        };

        self.authenticate(
            Credentials::new(username, password),
            Some("Password was read from the environment (not shown)."),
        )
        .await
    }

    async fn authenticate_with_file(&self, session_key: &str, path: &str) -> ToolOutput {
        if self.pending.peek(session_key, Utc::now()).is_none() {
            return ToolOutput::error("Please set your username first using the 'set_username' tool");
        }

        let password = match read_password_file(path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::error(format!("Could not read password file: {:#}", e)),
        };

        let Some(username) = self.pending.take(session_key, Utc::now()) else {
            return ToolOutput::error("Please set your username first using the 'set_username' tool");
        };

        let source = format!("Password was read from file: {}", path);
        self.authenticate(Credentials::from_secret(username, password), Some(&source))
            .await
    }

    async fn refresh(&self) -> ToolOutput {
        if !self.manager().is_authenticated().await {
            return ToolOutput::error("Not authenticated: there is no session to refresh");
        }

        if self.manager().refresh().await {
            let status = self.manager().status(Utc::now()).await;
            ToolOutput::ok(format!(
                "Session refreshed.\n\n{}",
                format::session_status(&status)
            ))
        } else {
            ToolOutput::error(
                "Session refresh failed. The previous session is still in use until it expires.",
            )
        }
    }

    // --- public records tools ---

    async fn search_requests(&self, args: SearchArgs) -> ToolOutput {
        let limit = clamp_limit(args.limit);
        let query = args.query;
        let result = self
            .retry
            .invoke(|client| {
                let q = RequestQuery::search(query.clone(), limit);
                async move { client.list_requests(q).await }
            })
            .await;

        match result {
            Ok(requests) => ToolOutput::ok(format::request_list(&query, &requests)),
            Err(e) => ToolOutput::error(format!("Error searching FOIA requests: {}", e)),
        }
    }

    async fn foia_details(&self, foia_id: u64) -> ToolOutput {
        let request = match self.fetch_request(foia_id).await {
            Ok(r) => r,
            Err(e) => return ToolOutput::error(format!("Error getting FOIA details: {}", e)),
        };

        let comms = self
            .retry
            .invoke(|client| async move { client.list_communications(foia_id, 3).await })
            .await;
        if let Err(e) = &comms {
            tracing::warn!("Could not load communications for request {}: {}", foia_id, e);
        }

        ToolOutput::ok(format::request_details(&request, comms.ok().as_deref()))
    }

    async fn request_communications(&self, foia_id: u64, limit: usize) -> ToolOutput {
        let request = match self.fetch_request(foia_id).await {
            Ok(r) => r,
            Err(e) => return ToolOutput::error(format!("Error getting communications: {}", e)),
        };

        match self
            .retry
            .invoke(|client| async move { client.list_communications(foia_id, limit).await })
            .await
        {
            Ok(comms) => ToolOutput::ok(format::communications(&request, &comms)),
            Err(e) => ToolOutput::error(format!("Error getting communications: {}", e)),
        }
    }

    async fn request_files(&self, foia_id: u64) -> ToolOutput {
        let request = match self.fetch_request(foia_id).await {
            Ok(r) => r,
            Err(e) => return ToolOutput::error(format!("Error getting files: {}", e)),
        };

        match self
            .retry
            .invoke(|client| async move { client.list_communications(foia_id, MAX_LIMIT).await })
            .await
        {
            Ok(comms) => ToolOutput::ok(format::files(&request, &comms)),
            Err(e) => ToolOutput::error(format!("Error getting files: {}", e)),
        }
    }

    async fn search_agencies(&self, args: SearchArgs) -> ToolOutput {
        let limit = clamp_limit(args.limit);
        let query = args.query;
        match self
            .retry
            .invoke(|client| {
                let q = query.clone();
                async move { client.list_agencies(q, limit).await }
            })
            .await
        {
            Ok(agencies) => ToolOutput::ok(format::agency_list(&query, &agencies)),
            Err(e) => ToolOutput::error(format!("Error searching agencies: {}", e)),
        }
    }

    async fn agency_details(&self, agency_id: u64) -> ToolOutput {
        match self
            .retry
            .invoke(|client| async move { client.get_agency(agency_id).await })
            .await
        {
            Ok(agency) => ToolOutput::ok(format::agency_details(&agency)),
            Err(e) => ToolOutput::error(format!("Error getting agency details: {}", e)),
        }
    }

    async fn search_jurisdictions(&self, args: SearchArgs) -> ToolOutput {
        let limit = clamp_limit(args.limit);
        let query = args.query;
        match self
            .retry
            .invoke(|client| {
                let q = query.clone();
                async move { client.list_jurisdictions(q, limit).await }
            })
            .await
        {
            Ok(found) => ToolOutput::ok(format::jurisdiction_list(&query, &found)),
            Err(e) => ToolOutput::error(format!("Error searching jurisdictions: {}", e)),
        }
    }

    // --- account tools ---

    async fn my_user_info(&self) -> ToolOutput {
        let user = match self.me().await {
            Ok(u) => u,
            Err(e) => return ToolOutput::error(format!("Error getting user info: {}", e)),
        };
        let orgs = self.organizations().await.ok();
        ToolOutput::ok(format::user_info(&user, orgs.as_deref()))
    }

    async fn my_requests(&self, args: MyRequestsArgs) -> ToolOutput {
        let user = match self.me().await {
            Ok(u) => u,
            Err(e) => return ToolOutput::error(format!("Error getting your requests: {}", e)),
        };

        let status = args.status.filter(|s| !s.trim().is_empty());
        let limit = clamp_limit(args.limit);
        let result = self
            .retry
            .invoke(|client| {
                let q = RequestQuery {
                    status: status.clone(),
                    user: Some(user.id),
                    limit,
                    ..Default::default()
                };
                async move { client.list_requests(q).await }
            })
            .await;

        match result {
            Ok(requests) => ToolOutput::ok(format::my_requests(status.as_deref(), &requests)),
            Err(e) => ToolOutput::error(format!("Error getting your requests: {}", e)),
        }
    }

    async fn file_request(&self, args: FileRequestArgs) -> ToolOutput {
        if args.title.trim().is_empty() || args.requested_docs.trim().is_empty() {
            return ToolOutput::error("Error: title and requested_docs are required");
        }
        if args.agency_ids.is_empty() {
            return ToolOutput::error("Error: at least one agency ID is required");
        }

        let orgs = match self.organizations().await {
            Ok(orgs) => orgs,
            Err(e) => return ToolOutput::error(format!("Error filing FOIA request: {}", e)),
        };

        let (organization, selection) = match select_organization(&orgs, args.organization_name.as_deref()) {
            Ok(selected) => selected,
            Err(output) => return output,
        };

        let request = NewRequest {
            title: args.title.clone(),
            requested_docs: args.requested_docs,
            agencies: args.agency_ids.clone(),
            organization: organization.id,
            embargo: args.embargo,
            permanent_embargo: args.permanent_embargo,
            request_fee_waiver: args.request_fee_waiver,
        };

        let created = match self
            .retry
            .invoke(|client| {
                let r = request.clone();
                async move { client.create_request(r).await }
            })
            .await
        {
            Ok(c) => c,
            Err(e) => return ToolOutput::error(format!("Error filing FOIA request: {}", e)),
        };

        tracing::info!(
            "Filed FOIA request '{}' with {} agencies under organization {}",
            args.title,
            args.agency_ids.len(),
            organization.id
        );

        let request_id = created
            .location
            .as_deref()
            .and_then(parse_request_id)
            .or_else(|| created.requests.first().copied());

        ToolOutput::ok(format::filed_request(&FiledRequest {
            title: &args.title,
            request_id,
            location: created.location.as_deref(),
            organization,
            selection: &selection,
            agency_count: args.agency_ids.len(),
            embargo: args.embargo,
            fee_waiver: args.request_fee_waiver,
        }))
    }

    async fn follow_up(&self, args: FollowUpArgs) -> ToolOutput {
        if args.message.trim().is_empty() {
            return ToolOutput::error("Error: message cannot be empty");
        }
        let foia_id = args.foia_id;

        let request = match self.fetch_request(foia_id).await {
            Ok(r) => r,
            Err(e) => return ToolOutput::error(format!("Error sending follow-up: {}", e)),
        };

        let message = args.message;
        match self
            .retry
            .invoke(|client| {
                let m = message.clone();
                async move { client.follow_up(foia_id, m).await }
            })
            .await
        {
            Ok(()) => ToolOutput::ok(format!(
                "Follow-up sent successfully:\n**Request:** {}\n**Request ID:** {}\n**Message sent:** {}",
                request.title,
                foia_id,
                format::truncate_chars(&message, 200)
            )),
            Err(e) => ToolOutput::error(format!("Error sending follow-up: {}", e)),
        }
    }

    async fn appeal(&self, args: AppealArgs) -> ToolOutput {
        if args.appeal_message.trim().is_empty() {
            return ToolOutput::error("Error: appeal_message cannot be empty");
        }
        let foia_id = args.foia_id;

        let request = match self.fetch_request(foia_id).await {
            Ok(r) => r,
            Err(e) => return ToolOutput::error(format!("Error filing appeal: {}", e)),
        };

        if !APPEALABLE_STATUSES.contains(&request.status.as_str()) {
            return ToolOutput::error(format!(
                "Error: Can only appeal requests with status 'rejected', 'partial', or 'no_docs'. Current status: {}",
                request.status
            ));
        }

        let message = args.appeal_message;
        match self
            .retry
            .invoke(|client| {
                let m = message.clone();
                async move { client.appeal(foia_id, m).await }
            })
            .await
        {
            Ok(()) => ToolOutput::ok(format!(
                "Appeal submitted successfully:\n**Request:** {}\n**Request ID:** {}\n**Previous Status:** {}\n**Appeal Message:** {}",
                request.title,
                foia_id,
                request.status,
                format::truncate_chars(&message, 300)
            )),
            Err(e) => ToolOutput::error(format!("Error filing appeal: {}", e)),
        }
    }

    // --- shared remote calls ---

    async fn fetch_request(&self, foia_id: u64) -> Result<FoiaRequest, RemoteError> {
        self.retry
            .invoke(|client| async move { client.get_request(foia_id).await })
            .await
    }

    async fn me(&self) -> Result<User, RemoteError> {
        self.retry
            .invoke(|client| async move { client.me().await })
            .await
    }

    async fn organizations(&self) -> Result<Vec<Organization>, RemoteError> {
        self.retry
            .invoke(|client| async move { client.list_organizations().await })
            .await
    }
}

/// Pick the organization to file under.
/// One organization is used as-is; otherwise the name must match.
fn select_organization<'a>(
    orgs: &'a [Organization],
    wanted: Option<&str>,
) -> Result<(&'a Organization, String), ToolOutput> {
    match (orgs, wanted.map(str::trim).filter(|w| !w.is_empty())) {
        ([], _) => Err(ToolOutput::error(
            "Error: No organizations found for your account. \
             You need to be associated with an organization to file FOIA requests.",
        )),
        ([only], _) => Ok((
            only,
            format!("**Auto-selected organization:** {} (only option available)", only.name),
        )),
        (orgs, Some(wanted)) => {
            let needle = wanted.to_lowercase();
            orgs.iter()
                .find(|org| org.name.to_lowercase().contains(&needle))
                .map(|org| {
                    (
                        org,
                        format!("**Selected organization:** {} (matched '{}')", org.name, wanted),
                    )
                })
                .ok_or_else(|| {
                    ToolOutput::error(format::organization_choice(
                        &format!("Error: Could not find organization matching '{}'.", wanted),
                        orgs,
                    ))
                })
        }
        (orgs, None) => Err(ToolOutput::error(format::organization_choice(
            "Multiple organizations available. Please specify which one to file under.",
            orgs,
        ))),
    }
}
