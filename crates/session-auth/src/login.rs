//! Challenge/response login
//!
//! The login handshake is a linear sequence with no branches besides failure
//! exits:
//!
//! 1. `GET /` and require a 2xx challenge page
//! 2. Pull the one-time nonce out of the page's `<input name="nonce">`
//! 3. `POST /login` with `username`, `password` and `nonce` as a form,
//!    without following the redirect the server answers with
//! 4. Take the session cookie from that redirect's `Set-Cookie`
//!
//! A login response without a cookie yields an empty token instead of an
//! error. Whether the login worked is decided by the next protected request.

use std::sync::LazyLock;

use common::Secret;
use regex::Regex;
use reqwest::header::{HeaderMap, SET_COOKIE};
use tracing::{debug, info, instrument, warn};

use crate::constants::{CHALLENGE_PATH, LOGIN_PATH, endpoint};
use crate::credentials::SessionToken;
use crate::error::{Error, Result};

static INPUT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b[^>]*>").expect("INPUT_TAG_RE should compile"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("ATTR_RE should compile")
});

/// One-time nonce scraped from the challenge page. Lives for a single login
/// attempt and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginChallenge {
    pub nonce: String,
}

impl LoginChallenge {
    /// Extract the challenge from the login page markup, if present.
    pub fn from_html(html: &str) -> Option<Self> {
        extract_nonce(html).map(|nonce| Self { nonce })
    }
}

/// Find the value of the `<input>` whose `name` is `nonce`.
///
/// Attribute order does not matter and values may be double-quoted,
/// single-quoted or bare. A bare value runs up to whitespace or `>`, so a
/// trailing `/` belongs to it as in HTML parsing. An empty value counts as
/// missing.
pub fn extract_nonce(html: &str) -> Option<String> {
    INPUT_TAG_RE.find_iter(html).find_map(|tag| {
        let mut is_nonce = false;
        let mut value = None;
        for caps in ATTR_RE.captures_iter(tag.as_str()) {
            let name = &caps[1];
            let attr_value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();

            if name.eq_ignore_ascii_case("name") {
                is_nonce = attr_value == "nonce";
            } else if name.eq_ignore_ascii_case("value") {
                value = Some(attr_value);
            }
        }
        match (is_nonce, value) {
            (true, Some(v)) if !v.is_empty() => Some(v.to_owned()),
            _ => None,
        }
    })
}

/// Build a session token from the `Set-Cookie` headers of a response.
///
/// Keeps each cookie's `name=value` pair, drops attributes such as `Path`,
/// and joins multiple cookies with `; ` so the result is usable as a
/// `Cookie` header. No `Set-Cookie` means an empty token.
pub fn capture_session(headers: &HeaderMap) -> SessionToken {
    let pairs: Vec<&str> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect();
    SessionToken::new(pairs.join("; "))
}

/// Performs the unauthenticated to authenticated handshake.
#[derive(Debug, Clone)]
pub struct LoginFlow {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: Secret<String>,
}

impl LoginFlow {
    /// `client` must not follow redirects; see [`crate::client::build_client`].
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: Secret<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            username: username.into(),
            password,
        }
    }

    /// Run the full handshake and return the captured session token.
    #[instrument(skip_all, fields(username = %self.username))]
    pub async fn login(&self) -> Result<SessionToken> {
        let html = self.fetch_challenge().await?;
        let challenge = LoginChallenge::from_html(&html).ok_or(Error::NonceNotFound)?;
        debug!("extracted login nonce");

        let token = self.submit_credentials(&challenge).await?;
        if token.is_empty() {
            warn!("login response carried no session cookie, deferring to next protected request");
        } else {
            info!("login captured session cookie");
        }
        Ok(token)
    }

    async fn fetch_challenge(&self) -> Result<String> {
        let url = endpoint(&self.base_url, CHALLENGE_PATH);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::ChallengeFetch(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ChallengeFetch(format!("GET {url} returned {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| Error::ChallengeFetch(format!("reading challenge body: {e}")))
    }

    async fn submit_credentials(&self, challenge: &LoginChallenge) -> Result<SessionToken> {
        let url = endpoint(&self.base_url, LOGIN_PATH);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.expose().as_str()),
                ("nonce", challenge.nonce.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

        debug!(status = response.status().as_u16(), "login response received");
        Ok(capture_session(response.headers()))
    }
}
