//! Auth-related error types

use thiserror::Error;

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors that can occur while signing in or out
#[derive(Error, Debug)]
pub enum AuthError {
    /// The email address is empty or malformed
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    /// The passcode is not six digits
    #[error("Passcode must be 6 digits")]
    InvalidCode,

    /// Building the HTTP client or reading a response body failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The auth server could not be reached
    #[error("Auth request failed: {0}")]
    Network(#[from] reqwest_middleware::Error),

    /// The auth server answered with an error status
    #[error("Auth server rejected the request ({status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Message returned by the server
        message: String,
    },

    /// Reading or writing the cached session failed
    #[error("Session cache error: {0}")]
    SessionStore(#[from] std::io::Error),

    /// The cached session or a server response could not be parsed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
