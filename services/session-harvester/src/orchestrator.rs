//! End-to-end harvesting run
//!
//! Strictly sequential; each step consumes the previous step's output:
//!
//! ```text
//! load cached cookie -> probe -> (login -> save)? -> /api/users
//!   -> /settings/tokens -> scrape -> sign -> /api/settings -> merge
//! ```
//!
//! A cached cookie that passes the probe always wins over a fresh login.

use serde::Serialize;
use session_auth::{
    CredentialStore, LoginFlow, PatternScraper, RequestSigner, SessionToken, SessionValidator,
    SettingsRequest, TokenScraper,
};
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::Result;

/// Final artifact of a run.
#[derive(Debug, Clone, Serialize)]
pub struct CombinedResult {
    pub users: serde_json::Value,
    #[serde(rename = "authenticatedUser")]
    pub authenticated_user: serde_json::Value,
}

/// How the session used for a run was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
    Cached,
    Login,
}

/// Composes credential storage, probing, login, scraping and signing.
pub struct SessionOrchestrator {
    client: reqwest::Client,
    base_url: String,
    api_base_url: String,
    store: CredentialStore,
    validator: SessionValidator,
    login: LoginFlow,
    scraper: Box<dyn TokenScraper>,
    signer: RequestSigner,
}

impl SessionOrchestrator {
    pub fn new(config: &Config) -> Result<Self> {
        let client = session_auth::build_client(config.server.timeout())?;
        Ok(Self {
            validator: SessionValidator::new(client.clone(), &config.server.base_url),
            login: LoginFlow::new(
                client.clone(),
                config.server.base_url.clone(),
                config.auth.username.clone(),
                config.auth.password.clone(),
            ),
            store: CredentialStore::new(config.storage.credential_file.clone()),
            scraper: Box::new(PatternScraper),
            signer: RequestSigner::new(config.signing.secret.clone()),
            base_url: config.server.base_url.clone(),
            api_base_url: config.server.api_base_url.clone(),
            client,
        })
    }

    /// Replace the markup scraper, e.g. with a parser-backed implementation.
    #[allow(dead_code)]
    pub fn with_scraper(mut self, scraper: Box<dyn TokenScraper>) -> Self {
        self.scraper = scraper;
        self
    }

    /// Reuse the cached session if the probe accepts it, otherwise log in
    /// and persist the new cookie.
    ///
    /// An empty cookie from the login response is persisted and returned as
    /// is; the first protected request decides whether it works.
    pub async fn establish_session(&self) -> Result<(SessionToken, SessionSource)> {
        if let Some(cached) = self.store.load().await {
            if cached.token.is_empty() {
                debug!("cached credential is empty, skipping probe");
            } else if self.validator.is_valid(&cached.token).await {
                info!(saved_at = cached.saved_at, "reusing saved session");
                return Ok((cached.token, SessionSource::Cached));
            } else {
                info!("saved session rejected");
            }
        }

        info!("logging in");
        let token = self.login.login().await?;
        self.store.save(&token).await?;
        Ok((token, SessionSource::Login))
    }

    /// Run the whole flow and return the merged result.
    #[instrument(skip_all, fields(scraper = self.scraper.id()))]
    pub async fn run(&self) -> Result<CombinedResult> {
        let (token, source) = self.establish_session().await?;
        debug!(?source, "session established");

        let users = session_auth::fetch_users(&self.client, &self.base_url, &token).await?;

        let html = session_auth::fetch_tokens_page(&self.client, &self.base_url, &token).await?;
        let fields = self.scraper.extract(&html).into_complete()?;
        debug!("scraped all token fields");

        let signed = self.signer.sign(fields.as_map())?;
        debug!(timestamp = signed.timestamp, "signed settings request");

        let authenticated_user = session_auth::fetch_settings(
            &self.client,
            &self.api_base_url,
            &token,
            &SettingsRequest::new(&fields, &signed),
        )
        .await?;

        Ok(CombinedResult {
            users,
            authenticated_user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use axum::Json;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use common::Secret;
    use session_auth::{RequestSigner, ScrapedTokens, TOKEN_FIELDS};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::net::TcpListener;

    const FULL_TOKENS_PAGE: &str = r#"
        <input type="hidden" id="access_token" value="at-1f2e">
        <input type="hidden" id="openId" value="open-9">
        <input type="hidden" id="userId" value="d9b6c0e0">
        <input type="hidden" id="apiuser" value="demo@example.org">
        <input type="hidden" id="operateId" value="op-77">
        <input type="hidden" id="language" value="en_US">
    "#;

    /// Request counters observed by the fake application.
    #[derive(Default)]
    struct Hits {
        challenge: AtomicU64,
        login: AtomicU64,
        users: AtomicU64,
        settings: AtomicU64,
    }

    #[derive(Clone)]
    struct FakeApp {
        hits: Arc<Hits>,
        tokens_page: &'static str,
    }

    fn cookie(headers: &HeaderMap) -> Option<&str> {
        headers.get("cookie").and_then(|v| v.to_str().ok())
    }

    /// Fake application: fixed nonce, any login yields `SID=abc123`, only that
    /// cookie is accepted, and `/api/settings` echoes the signed body.
    async fn start_fake_app(tokens_page: &'static str) -> (String, Arc<Hits>) {
        let hits = Arc::new(Hits::default());
        let state = FakeApp {
            hits: hits.clone(),
            tokens_page,
        };

        let app = axum::Router::new()
            .route(
                "/",
                get(|State(app): State<FakeApp>| async move {
                    app.hits.challenge.fetch_add(1, Ordering::Relaxed);
                    r#"<form><input type="hidden" name="nonce" value="fixed-nonce"></form>"#
                }),
            )
            .route(
                "/login",
                post(|State(app): State<FakeApp>| async move {
                    app.hits.login.fetch_add(1, Ordering::Relaxed);
                    (
                        StatusCode::FOUND,
                        [
                            (header::SET_COOKIE, "SID=abc123; Path=/; HttpOnly"),
                            (header::LOCATION, "/list"),
                        ],
                    )
                }),
            )
            .route(
                "/api/users",
                post(|State(app): State<FakeApp>, headers: HeaderMap| async move {
                    app.hits.users.fetch_add(1, Ordering::Relaxed);
                    if cookie(&headers) == Some("SID=abc123") {
                        Json(serde_json::json!([{"id": 1, "name": "Ada"}])).into_response()
                    } else {
                        StatusCode::UNAUTHORIZED.into_response()
                    }
                }),
            )
            .route(
                "/settings/tokens",
                get(|State(app): State<FakeApp>, headers: HeaderMap| async move {
                    if cookie(&headers) == Some("SID=abc123") {
                        app.tokens_page.into_response()
                    } else {
                        StatusCode::UNAUTHORIZED.into_response()
                    }
                }),
            )
            .route(
                "/api/settings",
                post(
                    |State(app): State<FakeApp>,
                     headers: HeaderMap,
                     Json(body): Json<serde_json::Value>| async move {
                        app.hits.settings.fetch_add(1, Ordering::Relaxed);
                        if cookie(&headers) != Some("SID=abc123") {
                            return StatusCode::UNAUTHORIZED.into_response();
                        }
                        Json(serde_json::json!({
                            "id": body["userId"],
                            "email": body["apiuser"],
                            "checkcode": body["checkcode"],
                            "timestamp": body["timestamp"],
                            "signed": body,
                        }))
                        .into_response()
                    },
                ),
            )
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), hits)
    }

    fn test_config(base: &str, dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.server.base_url = base.to_string();
        config.server.api_base_url = base.to_string();
        config.server.timeout_secs = 5;
        config.storage.credential_file = dir.join("authentication.json");
        config.storage.output_file = dir.join("users.json");
        config
    }

    #[tokio::test]
    async fn end_to_end_logs_in_and_persists_cookie() {
        let (base, hits) = start_fake_app(FULL_TOKENS_PAGE).await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&base, dir.path());
        config.signing.secret = Secret::from("e2e-secret");

        let orchestrator = SessionOrchestrator::new(&config).unwrap();
        let result = orchestrator.run().await.unwrap();

        assert_eq!(result.users[0]["name"], "Ada");
        assert_eq!(result.authenticated_user["id"], "d9b6c0e0");
        assert_eq!(result.authenticated_user["email"], "demo@example.org");

        // The server must be able to recompute the checkcode from what it received
        let signed = &result.authenticated_user["signed"];
        let fields: BTreeMap<String, String> = TOKEN_FIELDS
            .iter()
            .map(|name| (name.to_string(), signed[*name].as_str().unwrap().to_string()))
            .collect();
        assert_eq!(fields["access_token"], "at-1f2e");
        let timestamp = signed["timestamp"].as_u64().unwrap();
        let expected = RequestSigner::new(Secret::from("e2e-secret"))
            .sign_at(&fields, timestamp)
            .unwrap();
        assert_eq!(signed["checkcode"], expected.checkcode.as_str());

        let stored = CredentialStore::new(config.storage.credential_file.clone())
            .load()
            .await
            .unwrap();
        assert_eq!(stored.token.as_str(), "SID=abc123");

        assert_eq!(hits.challenge.load(Ordering::Relaxed), 1);
        assert_eq!(hits.login.load(Ordering::Relaxed), 1);
        assert_eq!(hits.settings.load(Ordering::Relaxed), 1);

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("users").is_some());
        assert!(json.get("authenticatedUser").is_some());
    }

    #[tokio::test]
    async fn valid_cached_session_skips_login() {
        let (base, hits) = start_fake_app(FULL_TOKENS_PAGE).await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&base, dir.path());
        CredentialStore::new(config.storage.credential_file.clone())
            .save(&SessionToken::new("SID=abc123"))
            .await
            .unwrap();

        let orchestrator = SessionOrchestrator::new(&config).unwrap();
        let (token, source) = orchestrator.establish_session().await.unwrap();

        assert_eq!(token.as_str(), "SID=abc123");
        assert_eq!(source, SessionSource::Cached);
        assert_eq!(hits.challenge.load(Ordering::Relaxed), 0);
        assert_eq!(hits.login.load(Ordering::Relaxed), 0);
        assert_eq!(hits.users.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn stale_cached_session_triggers_login() {
        let (base, hits) = start_fake_app(FULL_TOKENS_PAGE).await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&base, dir.path());
        let store = CredentialStore::new(config.storage.credential_file.clone());
        store.save(&SessionToken::new("SID=expired")).await.unwrap();

        let orchestrator = SessionOrchestrator::new(&config).unwrap();
        let (token, source) = orchestrator.establish_session().await.unwrap();

        assert_eq!(token.as_str(), "SID=abc123");
        assert_eq!(source, SessionSource::Login);
        assert_eq!(hits.login.load(Ordering::Relaxed), 1);
        assert_eq!(store.load().await.unwrap().token.as_str(), "SID=abc123");
    }

    #[tokio::test]
    async fn corrupt_credential_file_triggers_login() {
        let (base, hits) = start_fake_app(FULL_TOKENS_PAGE).await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&base, dir.path());
        std::fs::write(&config.storage.credential_file, "garbage").unwrap();

        let orchestrator = SessionOrchestrator::new(&config).unwrap();
        let (_, source) = orchestrator.establish_session().await.unwrap();

        assert_eq!(source, SessionSource::Login);
        assert_eq!(hits.users.load(Ordering::Relaxed), 0, "no probe without a cookie");
        assert_eq!(hits.login.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn empty_cached_cookie_skips_probe() {
        let (base, hits) = start_fake_app(FULL_TOKENS_PAGE).await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&base, dir.path());
        CredentialStore::new(config.storage.credential_file.clone())
            .save(&SessionToken::default())
            .await
            .unwrap();

        let orchestrator = SessionOrchestrator::new(&config).unwrap();
        let (_, source) = orchestrator.establish_session().await.unwrap();

        assert_eq!(source, SessionSource::Login);
        assert_eq!(hits.users.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn incomplete_scrape_never_signs_or_requests_settings() {
        const PARTIAL: &str = r#"
            <input type="hidden" id="access_token" value="at-1f2e">
            <input type="hidden" id="apiuser" value="demo@example.org">
        "#;
        let (base, hits) = start_fake_app(PARTIAL).await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&base, dir.path());

        let err = SessionOrchestrator::new(&config)
            .unwrap()
            .run()
            .await
            .unwrap_err();

        match err {
            Error::Auth(session_auth::Error::IncompleteTokens { missing }) => {
                assert_eq!(missing, vec!["language", "openId", "operateId", "userId"]);
            }
            other => panic!("expected IncompleteTokens, got {other:?}"),
        }
        assert_eq!(hits.settings.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn login_without_nonce_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().route("/", get(|| async { "<html></html>" }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&format!("http://{addr}"), dir.path());
        let err = SessionOrchestrator::new(&config)
            .unwrap()
            .run()
            .await
            .unwrap_err();

        assert!(
            matches!(err, Error::Auth(session_auth::Error::NonceNotFound)),
            "got: {err:?}"
        );
        assert!(!config.storage.credential_file.exists());
    }

    /// Scraper that ignores the markup and returns fixed values.
    struct FixedScraper;

    impl TokenScraper for FixedScraper {
        fn id(&self) -> &str {
            "fixed"
        }

        fn extract(&self, _html: &str) -> ScrapedTokens {
            let mut tokens = ScrapedTokens::default();
            for name in session_auth::TOKEN_FIELDS {
                tokens.insert(name, format!("fixed-{name}"));
            }
            tokens
        }
    }

    #[tokio::test]
    async fn custom_scraper_is_used() {
        let (base, _hits) = start_fake_app("<html>no fields here</html>").await;
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&base, dir.path());

        let result = SessionOrchestrator::new(&config)
            .unwrap()
            .with_scraper(Box::new(FixedScraper))
            .run()
            .await
            .unwrap();

        assert_eq!(result.authenticated_user["id"], "fixed-userId");
    }
}
