//! Token: the signed capability grant.
//!
//! A token bundles a principal binding, a [`Scope`], a validity window,
//! and a signature over a canonical serialization of everything else.
//! Tokens are immutable once signed — there are no mutators, and any
//! field change on a copy invalidates its signature on the next
//! verification.

use crate::error::{Error, Result};
use crate::request::Principal;
use crate::scope::Scope;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Prefix carried by every token identifier.
pub const TOKEN_ID_PREFIX: &str = "pccap_";

/// Signature algorithm tag, stored on the wire alongside the signature.
///
/// The tag is itself a signed field, and keyrings refuse tokens whose tag
/// disagrees with their own algorithm, so a signature can never be
/// re-interpreted under a different scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "HS256")]
    Hs256,
    #[serde(rename = "Ed25519")]
    Ed25519,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Hs256 => "HS256",
            Algorithm::Ed25519 => "Ed25519",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unique identifier for a token.
///
/// Random (UUIDv4) rather than time-ordered: capability identifiers must
/// not leak issue timing or be guessable in sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TokenId(String);

/// Short preview of a rejected id for error messages. Truncates on a
/// character boundary; a byte offset could fall inside a multi-byte
/// character in hostile input.
fn id_preview(s: &str) -> &str {
    match s.char_indices().nth(20) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if !s.starts_with(TOKEN_ID_PREFIX) {
            return Err(serde::de::Error::custom(format!(
                "token ID must start with '{}', got: {}",
                TOKEN_ID_PREFIX,
                id_preview(&s)
            )));
        }
        Ok(TokenId(s))
    }
}

impl TokenId {
    /// Generate a fresh random token ID.
    pub fn new() -> Self {
        Self(format!("{}{}", TOKEN_ID_PREFIX, Uuid::new_v4().simple()))
    }

    /// Create a token ID from a string.
    ///
    /// Returns `InvalidTokenId` if the string doesn't start with `pccap_`.
    pub fn from_string(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if !s.starts_with(TOKEN_ID_PREFIX) {
            return Err(Error::InvalidTokenId(format!(
                "must start with '{}', got: {}",
                TOKEN_ID_PREFIX,
                id_preview(&s)
            )));
        }
        Ok(Self(s))
    }

    /// Get the ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current time as fractional seconds since the Unix epoch.
pub fn now_epoch() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Random nonce: 16 bytes from the OS CSPRNG, base64 URL-safe unpadded.
///
/// Distinguishes two tokens minted in the same instant with otherwise
/// identical fields.
fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// A signed capability grant.
///
/// Field names and JSON shapes are load-bearing: hosts persist tokens in
/// receipts and feed them back for evaluation. `policy_id` serializes as
/// an explicit `null` when absent; `signature` is omitted entirely when
/// unsigned and is never part of the signing view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    pub token_id: TokenId,

    /// Subject this grant is bound to; checked against the presenting
    /// principal on every enforcement.
    pub principal_sub: String,

    pub scope: Scope,

    /// Epoch seconds, fractional.
    pub issued_at: f64,

    /// Epoch seconds, fractional. `now >= expires_at` means expired.
    pub expires_at: f64,

    /// Identifier of the approving authority.
    pub issued_by: String,

    /// Back-reference to the policy rule that demanded approval.
    pub policy_id: Option<String>,

    /// If true, at most one successful enforcement before the grant is
    /// irrevocably consumed.
    pub single_use: bool,

    pub nonce: String,

    pub algorithm: Algorithm,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<String>,
}

impl Token {
    /// Construct a fresh, unsigned token.
    ///
    /// Generates the identifier and nonce, stamps the validity window at
    /// the current clock. The caller (normally the engine) signs it and
    /// fills in `signature`.
    pub fn issue(
        principal: &Principal,
        scope: Scope,
        issued_by: impl Into<String>,
        ttl: Duration,
        policy_id: Option<String>,
        single_use: bool,
        algorithm: Algorithm,
    ) -> Self {
        let issued_at = now_epoch();
        Self {
            token_id: TokenId::new(),
            principal_sub: principal.sub.clone(),
            scope,
            issued_at,
            expires_at: issued_at + ttl.as_secs_f64(),
            issued_by: issued_by.into(),
            policy_id,
            single_use,
            nonce: generate_nonce(),
            algorithm,
            signature: None,
        }
    }

    /// Canonical signing bytes: every field except `signature`, as compact
    /// JSON with lexicographically ordered keys.
    ///
    /// Deterministic — identical field values yield identical bytes, so an
    /// independent implementation can reproduce the signing message.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let mut value =
            serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))?;
        if let Some(map) = value.as_object_mut() {
            map.remove("signature");
        }
        serde_json::to_vec(&value).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Whether the token is expired relative to an explicit clock reading.
    pub fn is_expired_at(&self, now: f64) -> bool {
        now >= self.expires_at
    }

    /// Whether the token is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_epoch())
    }
}
