//! The enforcement decision procedure.
//!
//! [`enforce`] combines keyring, scope, token, and request into a single
//! allow/deny [`Verdict`]. A denial is a normal outcome — most requests
//! for high-risk actions are expected to be denied — so nothing in this
//! module returns an error.

use crate::keyring::Keyring;
use crate::request::{Arguments, Principal};
use crate::token::Token;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable decision codes, one per check that can fail plus the success
/// case. The wire names are load-bearing: hosts persist them in receipts
/// and alert on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    #[serde(rename = "PCCAP_VALID")]
    Valid,
    #[serde(rename = "PCCAP_EXPIRED")]
    Expired,
    #[serde(rename = "PCCAP_SIGNATURE_INVALID")]
    SignatureInvalid,
    #[serde(rename = "PCCAP_PRINCIPAL_MISMATCH")]
    PrincipalMismatch,
    #[serde(rename = "PCCAP_SCOPE_MISMATCH")]
    ScopeMismatch,
    #[serde(rename = "PCCAP_REPLAY")]
    Replay,
    #[serde(rename = "PCCAP_NOT_FOUND")]
    NotFound,
    #[serde(rename = "PCCAP_NO_TOKEN")]
    NoToken,
}

impl ReasonCode {
    /// Wire name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Valid => "PCCAP_VALID",
            ReasonCode::Expired => "PCCAP_EXPIRED",
            ReasonCode::SignatureInvalid => "PCCAP_SIGNATURE_INVALID",
            ReasonCode::PrincipalMismatch => "PCCAP_PRINCIPAL_MISMATCH",
            ReasonCode::ScopeMismatch => "PCCAP_SCOPE_MISMATCH",
            ReasonCode::Replay => "PCCAP_REPLAY",
            ReasonCode::NotFound => "PCCAP_NOT_FOUND",
            ReasonCode::NoToken => "PCCAP_NO_TOKEN",
        }
    }

    /// Human summary, for dashboards and audit search.
    pub fn description(&self) -> &'static str {
        match self {
            ReasonCode::Valid => "token authorizes the request",
            ReasonCode::Expired => "token validity window has passed",
            ReasonCode::SignatureInvalid => "token signature does not verify",
            ReasonCode::PrincipalMismatch => "token is bound to a different principal",
            ReasonCode::ScopeMismatch => "request falls outside the token's scope",
            ReasonCode::Replay => "single-use token was already consumed",
            ReasonCode::NotFound => "no token exists under the presented id",
            ReasonCode::NoToken => "principal holds no token matching the request",
        }
    }

    /// True only for the success code.
    pub fn is_allow(&self) -> bool {
        matches!(self, ReasonCode::Valid)
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a capability decision.
///
/// Constructed only through [`Verdict::allow`] / [`Verdict::deny`], so the
/// flag and the code can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    allowed: bool,
    code: ReasonCode,
    reason: String,
}

impl Verdict {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            code: ReasonCode::Valid,
            reason: reason.into(),
        }
    }

    pub fn deny(code: ReasonCode, reason: impl Into<String>) -> Self {
        debug_assert!(!code.is_allow(), "deny verdicts need a denial code");
        Self {
            allowed: false,
            code,
            reason: reason.into(),
        }
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    pub fn code(&self) -> ReasonCode {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {}",
            if self.allowed { "ALLOW" } else { "DENY" },
            self.code,
            self.reason
        )
    }
}

/// Render an epoch timestamp for human-readable reasons.
fn format_epoch(ts: f64) -> String {
    let secs = ts.floor() as i64;
    let nanos = ((ts - ts.floor()) * 1e9) as u32;
    match chrono::DateTime::from_timestamp(secs, nanos) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => format!("{}", ts),
    }
}

/// Decide whether `token` authorizes this request.
///
/// Checks run in a fixed order, each short-circuiting to its own denial
/// code: expiry, signature, principal binding, scope. Expiry and
/// signature come first deliberately — a stale or tampered token is
/// rejected identically no matter what it claims to permit, and scope
/// evaluation only ever runs on cryptographically-proven live tokens.
pub fn enforce(
    principal: &Principal,
    tool_name: &str,
    arguments: &Arguments,
    token: &Token,
    keyring: &Keyring,
) -> Verdict {
    if token.is_expired() {
        return Verdict::deny(
            ReasonCode::Expired,
            format!("token expired at {}", format_epoch(token.expires_at)),
        );
    }

    if !keyring.verify(token) {
        return Verdict::deny(
            ReasonCode::SignatureInvalid,
            format!("signature verification failed for {}", token.token_id),
        );
    }

    if token.principal_sub != principal.sub {
        return Verdict::deny(
            ReasonCode::PrincipalMismatch,
            format!(
                "token bound to '{}', presented by '{}'",
                token.principal_sub, principal.sub
            ),
        );
    }

    if let Err(mismatch) = token.scope.matches_request(tool_name, arguments) {
        return Verdict::deny(ReasonCode::ScopeMismatch, format!("scope mismatch: {}", mismatch));
    }

    Verdict::allow(format!("token {} authorizes {}", token.token_id, tool_name))
}
