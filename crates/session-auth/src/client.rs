//! HTTP client construction
//!
//! One client is shared by every step of a run. Redirects are never followed:
//! the login step needs the raw `Set-Cookie` of the redirect response, and a
//! protected endpoint that bounces to the login page must read as a
//! rejection rather than as the login page's 200.

use std::time::Duration;

use crate::error::{Error, Result};

/// Build the shared client with the given per-request timeout.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .user_agent(concat!("session-auth/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Http(format!("building HTTP client: {e}")))
}
