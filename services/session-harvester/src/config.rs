//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. Every section has
//! defaults pointing at the public demo deployment, so the harvester runs
//! with no config file at all. The password and signing secret are loaded
//! from env vars or secret files, never from the TOML directly.

use common::Secret;
use serde::Deserialize;
use session_auth::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_BASE_URL, DEFAULT_PASSWORD, DEFAULT_SIGNING_SECRET,
    DEFAULT_USERNAME,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_PATH: &str = "session-harvester.toml";

/// Env var holding the login password
pub const PASSWORD_ENV: &str = "HARVESTER_PASSWORD";

/// Env var holding the HMAC signing secret
pub const SIGNING_SECRET_ENV: &str = "HARVESTER_SIGNING_SECRET";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub signing: SigningConfig,
    pub storage: StorageConfig,
}

/// Remote application endpoints
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Cookie-session application (challenge, login, users, tokens page)
    pub base_url: String,
    /// API host serving the signed settings endpoint
    pub api_base_url: String,
    /// Per-request timeout
    pub timeout_secs: u64,
}

/// Login credentials
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username: String,
    #[serde(skip, default = "default_password")]
    pub password: Secret<String>,
    /// Path to a file containing the password (alternative to HARVESTER_PASSWORD)
    pub password_file: Option<PathBuf>,
}

/// Checkcode signing settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    #[serde(skip, default = "default_signing_secret")]
    pub secret: Secret<String>,
    /// Path to a file containing the secret (alternative to HARVESTER_SIGNING_SECRET)
    pub secret_file: Option<PathBuf>,
}

/// Local files
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Cached session cookie
    pub credential_file: PathBuf,
    /// Combined result artifact
    pub output_file: PathBuf,
}

fn default_password() -> Secret<String> {
    Secret::from(DEFAULT_PASSWORD)
}

fn default_signing_secret() -> Secret<String> {
    Secret::from(DEFAULT_SIGNING_SECRET)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_base_url: DEFAULT_API_BASE_URL.into(),
            timeout_secs: 30,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.into(),
            password: default_password(),
            password_file: None,
        }
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            secret: default_signing_secret(),
            secret_file: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credential_file: PathBuf::from("authentication.json"),
            output_file: PathBuf::from("users.json"),
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay secrets.
    ///
    /// Secret resolution order (password and signing secret alike):
    /// 1. env var
    /// 2. `*_file` path from config
    /// 3. built-in demo default
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.finish()
    }

    /// Load `path` if it exists, otherwise start from defaults.
    ///
    /// Only meant for the implicit default location: a path the operator
    /// named explicitly should go through [`Config::load`] so a typo fails.
    pub fn load_or_default(path: &Path) -> common::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Config::default().finish()
        }
    }

    fn finish(mut self) -> common::Result<Self> {
        self.validate()?;

        if let Some(secret) = resolve_secret(PASSWORD_ENV, self.auth.password_file.as_deref())? {
            self.auth.password = secret;
        }
        if let Some(secret) =
            resolve_secret(SIGNING_SECRET_ENV, self.signing.secret_file.as_deref())?
        {
            self.signing.secret = secret;
        }
        Ok(self)
    }

    fn validate(&self) -> common::Result<()> {
        for (name, url) in [
            ("base_url", &self.server.base_url),
            ("api_base_url", &self.server.api_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.auth.username.trim().is_empty() {
            return Err(common::Error::Config("username must not be empty".into()));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    ///
    /// The flag tells whether the path was named explicitly.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_PATH), false)
    }
}

/// Env var wins over file; an empty or whitespace-only file yields `None`.
fn resolve_secret(env_var: &str, file: Option<&Path>) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env_var) {
        return Ok(Some(Secret::new(value)));
    }
    let Some(file) = file else {
        return Ok(None);
    };
    let value = std::fs::read_to_string(file).map_err(|e| {
        common::Error::Config(format!("failed to read secret file {}: {e}", file.display()))
    })?;
    let value = value.trim().to_owned();
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(Secret::new(value)))
}
