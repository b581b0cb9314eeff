//! Cookie-session authentication and signed request construction
//!
//! Building blocks for talking to a cookie-session web application whose
//! API host wants HMAC-signed requests:
//!
//! 1. `CredentialStore::load()` returns a cached session cookie, if any
//! 2. `SessionValidator::is_valid()` probes it against the users API
//! 3. `LoginFlow::login()` performs the nonce handshake when it is stale
//! 4. `CredentialStore::save()` persists the fresh cookie
//! 5. `TokenScraper::extract()` pulls the hidden fields off the tokens page
//! 6. `RequestSigner::sign()` computes the checkcode for the settings API
//!
//! The crate holds no global state; every endpoint, credential and secret is
//! passed in by the caller.

pub mod api;
pub mod client;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod login;
pub mod probe;
pub mod scrape;
pub mod signer;

pub use api::{SettingsRequest, fetch_settings, fetch_tokens_page, fetch_users};
pub use client::build_client;
pub use credentials::{CredentialStore, SessionToken, StoredCredential};
pub use error::{Error, Result};
pub use login::{LoginChallenge, LoginFlow, capture_session, extract_nonce};
pub use probe::SessionValidator;
pub use scrape::{PatternScraper, ScrapedTokens, TOKEN_FIELDS, TokenFieldSet, TokenScraper};
pub use signer::{RequestSigner, SignedPayload};
