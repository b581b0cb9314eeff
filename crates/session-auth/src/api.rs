//! Protected resource calls
//!
//! Every call carries the session cookie and must come back 2xx. Unlike the
//! session probe, a failure here is fatal for the run: the session was
//! already established, so a rejection means the server's contract changed.

use reqwest::header::COOKIE;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::constants::{SETTINGS_PATH, TOKENS_PATH, USERS_PATH, endpoint};
use crate::credentials::SessionToken;
use crate::error::{Error, Result};
use crate::scrape::TokenFieldSet;
use crate::signer::SignedPayload;

/// JSON body of the signed settings request: the six token fields plus the
/// signing timestamp and checkcode.
#[derive(Debug, Serialize)]
pub struct SettingsRequest<'a> {
    #[serde(flatten)]
    pub fields: &'a TokenFieldSet,
    pub timestamp: u64,
    pub checkcode: &'a str,
}

impl<'a> SettingsRequest<'a> {
    pub fn new(fields: &'a TokenFieldSet, signed: &'a SignedPayload) -> Self {
        Self {
            fields,
            timestamp: signed.timestamp,
            checkcode: &signed.checkcode,
        }
    }
}

/// `POST /api/users` with an empty body; returns the JSON list as-is.
#[instrument(skip_all)]
pub async fn fetch_users(
    client: &reqwest::Client,
    base_url: &str,
    token: &SessionToken,
) -> Result<serde_json::Value> {
    let response = client
        .post(endpoint(base_url, USERS_PATH))
        .header(COOKIE, token.as_str())
        .send()
        .await
        .map_err(|e| resource_error(USERS_PATH, format!("request failed: {e}")))?;

    read_json(USERS_PATH, response).await
}

/// `GET /settings/tokens`; returns the page markup.
#[instrument(skip_all)]
pub async fn fetch_tokens_page(
    client: &reqwest::Client,
    base_url: &str,
    token: &SessionToken,
) -> Result<String> {
    let response = client
        .get(endpoint(base_url, TOKENS_PATH))
        .header(COOKIE, token.as_str())
        .send()
        .await
        .map_err(|e| resource_error(TOKENS_PATH, format!("request failed: {e}")))?;

    let response = require_success(TOKENS_PATH, response).await?;
    response
        .text()
        .await
        .map_err(|e| resource_error(TOKENS_PATH, format!("reading body: {e}")))
}

/// `POST /api/settings` on the API host with the signed JSON body.
#[instrument(skip_all, fields(timestamp = request.timestamp))]
pub async fn fetch_settings(
    client: &reqwest::Client,
    api_base_url: &str,
    token: &SessionToken,
    request: &SettingsRequest<'_>,
) -> Result<serde_json::Value> {
    let response = client
        .post(endpoint(api_base_url, SETTINGS_PATH))
        .header(COOKIE, token.as_str())
        .json(request)
        .send()
        .await
        .map_err(|e| resource_error(SETTINGS_PATH, format!("request failed: {e}")))?;

    read_json(SETTINGS_PATH, response).await
}

async fn read_json(
    resource: &'static str,
    response: reqwest::Response,
) -> Result<serde_json::Value> {
    let response = require_success(resource, response).await?;
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| resource_error(resource, format!("invalid JSON body: {e}")))
}

async fn require_success(
    resource: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    debug!(resource, status = status.as_u16(), "protected resource responded");
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));
    Err(resource_error(resource, format!("returned {status}: {body}")))
}

fn resource_error(resource: &'static str, message: String) -> Error {
    Error::Resource { resource, message }
}
