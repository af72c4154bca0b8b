// Records API errors and their classification

use thiserror::Error;

/// Maximum length for error response bodies kept in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Markers that identify an authentication failure in untyped error text.
/// Matched case-insensitively.
const AUTH_MARKERS: &[&str] = &[
    "401",
    "unauthorized",
    "expired",
    "invalid token",
    "not authenticated",
    "authentication",
];

/// Broad category of a remote failure, used to decide who handles it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The session is no longer accepted; a re-login may fix it
    Authentication,
    /// Network, timeout, rate limit or server failure
    Transient,
    /// The remote rejected the request itself
    Validation,
    /// The requested resource does not exist
    NotFound,
    /// Anything else
    Other,
}

/// Errors returned by the records API client
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Credentials or session rejected
    #[error("Authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },

    /// Request rejected as invalid
    #[error("Request rejected ({status}): {message}")]
    Validation { status: u16, message: String },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited
    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    /// Server-side failure
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Timed out waiting for the remote
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Network failure
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Untyped failure, classified by its message
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..end],
                body.len()
            )
        }
    }

    /// Build an error from a non-success HTTP status and its body.
    ///
    /// 403 counts as an authentication failure: the API answers a missing or
    /// expired token with 403 when its first authenticator sends no challenge
    /// header, so a re-login is the right recovery.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = Self::truncate_body(body);
        match status {
            401 | 403 => RemoteError::Authentication { status, message },
            404 => RemoteError::NotFound(message),
            429 => RemoteError::RateLimited,
            500..=599 => RemoteError::Server { status, message },
            _ => RemoteError::Validation { status, message },
        }
    }

    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            RemoteError::Authentication { .. } => ErrorClass::Authentication,
            RemoteError::Validation { .. } | RemoteError::InvalidResponse(_) => {
                ErrorClass::Validation
            }
            RemoteError::NotFound(_) => ErrorClass::NotFound,
            RemoteError::RateLimited
            | RemoteError::Server { .. }
            | RemoteError::Timeout(_)
            | RemoteError::Network(_) => ErrorClass::Transient,
            RemoteError::Other(message) => {
                if has_auth_marker(message) {
                    ErrorClass::Authentication
                } else {
                    ErrorClass::Other
                }
            }
        }
    }

    /// Whether a re-login could resolve this failure
    pub fn is_authentication(&self) -> bool {
        self.class() == ErrorClass::Authentication
    }
}

/// Check free-form error text against the authentication markers
pub fn has_auth_marker(message: &str) -> bool {
    let lower = message.to_lowercase();
    AUTH_MARKERS.iter().any(|marker| lower.contains(marker))
}
