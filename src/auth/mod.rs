// Authentication module
// Session lifecycle, credential resolution and the auth-retry policy

mod credentials;
mod manager;
mod pending;
mod retry;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use credentials::{
    expand_tilde, read_password_file, CredentialPrompt, CredentialSource, DialoguerPrompt,
    PASSWORD_ENV, USERNAME_ENV,
};
pub use manager::AuthManager;
pub use pending::PendingLogins;
pub use retry::AuthRetryWrapper;
pub use types::{
    AccessType, AuthError, Credentials, Session, SessionSettings, SessionStatus, TestResult,
    TestStatus,
};
