//! Checkcode signing for the settings API
//!
//! The API host only accepts a request whose `checkcode` proves knowledge of
//! the shared secret:
//!
//! ```text
//! canonical = sort_by_key(fields + {timestamp})
//!               .map(|(k, v)| k + "=" + encodeURIComponent(v))
//!               .join("&")
//! checkcode = UPPERCASE_HEX(HMAC-SHA1(secret, canonical))
//! ```
//!
//! Keys sort by byte order, so `openId` lands before `operateId` and
//! `timestamp` before `userId`. The timestamp is whole unix seconds and must
//! be sampled fresh for every request.

use std::collections::BTreeMap;

use common::Secret;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// A signed request, derived once and sent once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    /// Sorted, encoded `key=value&...` string the checkcode covers
    pub canonical: String,
    /// Uppercase hex HMAC-SHA1 of `canonical`
    pub checkcode: String,
    /// Unix seconds included in `canonical`
    pub timestamp: u64,
    /// `canonical` followed by `&checkcode=<checkcode>`
    pub full_payload: String,
}

/// Computes checkcodes with a fixed shared secret.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    secret: Secret<String>,
}

impl RequestSigner {
    pub fn new(secret: Secret<String>) -> Self {
        Self { secret }
    }

    /// Sign `fields` at the current time.
    pub fn sign(&self, fields: &BTreeMap<String, String>) -> Result<SignedPayload> {
        self.sign_at(fields, unix_seconds())
    }

    /// Sign `fields` at a caller-supplied timestamp. A `timestamp` key in
    /// `fields` is replaced by the given value.
    pub fn sign_at(
        &self,
        fields: &BTreeMap<String, String>,
        timestamp: u64,
    ) -> Result<SignedPayload> {
        let timestamp_value = timestamp.to_string();
        let mut entries: BTreeMap<&str, &str> = fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        entries.insert("timestamp", &timestamp_value);

        let canonical = canonical_string(&entries);
        let checkcode = self.checkcode(&canonical)?;
        let full_payload = format!("{canonical}&checkcode={checkcode}");

        Ok(SignedPayload {
            canonical,
            checkcode,
            timestamp,
            full_payload,
        })
    }

    /// Uppercase hex HMAC-SHA1 of `message`.
    pub fn checkcode(&self, message: &str) -> Result<String> {
        let mut mac = HmacSha1::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Signing(format!("invalid HMAC key: {e}")))?;
        mac.update(message.as_bytes());
        Ok(hex::encode_upper(mac.finalize().into_bytes()))
    }
}

/// Join already-sorted entries as `key=encoded_value` pairs.
fn canonical_string(entries: &BTreeMap<&str, &str>) -> String {
    entries
        .iter()
        .map(|(key, value)| format!("{key}={}", encode_component(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode with `encodeURIComponent` semantics.
///
/// `urlencoding` leaves only `A-Z a-z 0-9 - _ . ~` unescaped; the server also
/// leaves `! ' ( ) *` alone, so those escapes are reverted. A literal `%` is
/// always emitted as `%25`, so no reverted sequence can come from input text.
pub fn encode_component(value: &str) -> String {
    urlencoding::encode(value)
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%2A", "*")
}

fn unix_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
