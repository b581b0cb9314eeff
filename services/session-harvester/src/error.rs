//! Service-specific error types

use thiserror::Error;

/// Fatal conditions that end a harvesting run.
///
/// Session probe failures never surface here; they are folded into the
/// reuse-or-login decision.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] session_auth::Error),

    #[error("writing output {path}: {message}")]
    Output { path: String, message: String },
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
