//! Session validity probe
//!
//! A cached cookie is only worth reusing if the application still accepts
//! it. The probe hits the users API with the candidate cookie and reports
//! success for any 2xx status. Everything else, including transport errors
//! and redirects, is an invalid session: the caller logs in again.

use reqwest::header::COOKIE;
use tracing::{debug, instrument};

use crate::constants::{USERS_PATH, endpoint};
use crate::credentials::SessionToken;

/// Checks whether a session token is still accepted by the application.
#[derive(Debug, Clone)]
pub struct SessionValidator {
    client: reqwest::Client,
    probe_url: String,
}

impl SessionValidator {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            probe_url: endpoint(base_url, USERS_PATH),
        }
    }

    /// Probe the users API with `token`. Never fails; absence of proof of
    /// validity is reported as `false`.
    #[instrument(skip_all, fields(url = %self.probe_url))]
    pub async fn is_valid(&self, token: &SessionToken) -> bool {
        let response = match self
            .client
            .post(&self.probe_url)
            .header(COOKIE, token.as_str())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "session probe request failed");
                return false;
            }
        };

        let status = response.status();
        debug!(status = status.as_u16(), "session probe completed");
        status.is_success()
    }
}
