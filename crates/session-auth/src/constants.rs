//! Endpoint paths and documented defaults
//!
//! Paths are fixed by the remote application. The defaults describe the
//! public demo deployment and are overridable through configuration; none of
//! them is a production secret.

/// Default base URL of the cookie-session web application
pub const DEFAULT_BASE_URL: &str = "https://challenge.sunvoy.com";

/// Default base URL of the API host serving signed requests
pub const DEFAULT_API_BASE_URL: &str = "https://api.challenge.sunvoy.com";

/// Demo account username
pub const DEFAULT_USERNAME: &str = "demo@example.org";

/// Demo account password
pub const DEFAULT_PASSWORD: &str = "test";

/// Shared HMAC secret used to compute the checkcode
pub const DEFAULT_SIGNING_SECRET: &str = "mys3cr3t";

/// Challenge page carrying the login nonce
pub const CHALLENGE_PATH: &str = "/";

/// Form-encoded login endpoint
pub const LOGIN_PATH: &str = "/login";

/// Users API, used both as the session probe and as primary resource
pub const USERS_PATH: &str = "/api/users";

/// HTML page carrying the hidden per-user token fields
pub const TOKENS_PATH: &str = "/settings/tokens";

/// Signed settings API on the API host
pub const SETTINGS_PATH: &str = "/api/settings";

/// Join a base URL and an absolute path without doubling the slash.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
