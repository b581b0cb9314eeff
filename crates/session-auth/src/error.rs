//! Error types for session authentication operations

/// Errors from login, scraping, signing and protected resource calls.
///
/// Session probe failures never appear here: an unreachable or rejecting
/// probe endpoint is reported as an invalid session, not an error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("challenge page fetch failed: {0}")]
    ChallengeFetch(String),

    #[error("nonce not found in challenge page")]
    NonceNotFound,

    #[error("token page is missing required fields: {}", .missing.join(", "))]
    IncompleteTokens { missing: Vec<&'static str> },

    #[error("protected resource {resource} failed: {message}")]
    Resource {
        resource: &'static str,
        message: String,
    },

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
