//! Hidden token extraction from the settings page
//!
//! The tokens page renders six per-user values as
//! `<input id="<name>" value="<value>">`. Scraping is targeted pattern
//! matching against that fixed template, hidden behind [`TokenScraper`] so a
//! parser-backed implementation can replace it without touching callers.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

/// Names of the hidden fields every signed settings request needs.
pub const TOKEN_FIELDS: [&str; 6] = [
    "access_token",
    "apiuser",
    "language",
    "openId",
    "operateId",
    "userId",
];

static FIELD_RES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    TOKEN_FIELDS
        .iter()
        .map(|&name| {
            let pattern = format!(r#"id="{}"\s+value="([^"]+)""#, regex::escape(name));
            let re = Regex::new(&pattern).expect("token field pattern should compile");
            (name, re)
        })
        .collect()
});

/// Result of scraping: each known field either found or absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedTokens {
    found: BTreeMap<&'static str, String>,
}

impl ScrapedTokens {
    /// Value of a known field, if it was found.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.found.get(name).map(String::as_str)
    }

    /// Record a value for one of [`TOKEN_FIELDS`]. Unknown names are ignored.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        if let Some(&known) = TOKEN_FIELDS.iter().find(|&&field| field == name) {
            self.found.insert(known, value.into());
        }
    }

    /// Known fields that were not found, in [`TOKEN_FIELDS`] order.
    pub fn missing(&self) -> Vec<&'static str> {
        TOKEN_FIELDS
            .iter()
            .copied()
            .filter(|name| !self.found.contains_key(*name))
            .collect()
    }

    /// Promote to a complete set, or fail naming every missing field.
    pub fn into_complete(self) -> Result<TokenFieldSet> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(Error::IncompleteTokens { missing });
        }
        Ok(TokenFieldSet(
            self.found
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value))
                .collect(),
        ))
    }
}

/// All six token fields, resolved. Serializes as a flat JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TokenFieldSet(BTreeMap<String, String>);

impl TokenFieldSet {
    /// The fields as a map, ready for [`crate::signer::RequestSigner`].
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

/// Extracts token fields from the tokens page markup.
///
/// Extraction never fails as a whole; fields that cannot be found are left
/// absent and the caller decides whether the result is usable.
pub trait TokenScraper: Send + Sync {
    /// Identifier for logging
    fn id(&self) -> &str;

    fn extract(&self, html: &str) -> ScrapedTokens;
}

/// Regex-based scraper for the `id="..." value="..."` template.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternScraper;

impl TokenScraper for PatternScraper {
    fn id(&self) -> &str {
        "pattern"
    }

    fn extract(&self, html: &str) -> ScrapedTokens {
        let mut tokens = ScrapedTokens::default();
        for (name, re) in FIELD_RES.iter() {
            if let Some(caps) = re.captures(html) {
                tokens.insert(name, &caps[1]);
            }
        }
        tokens
    }
}
