//! The policy-engine adapter.
//!
//! [`CapabilityEngine`] is what a host gateway talks to: it mints tokens
//! for approved actions, evaluates pending requests against held tokens,
//! and owns the only externally observable mutation in the crate —
//! consuming a single-use token. Keyring and store are injected at
//! construction; there is no process-global state beyond the optional
//! audit logger.

use crate::audit::{self, AuditEvent, AuditEventType};
use crate::enforce::{enforce, ReasonCode, Verdict};
use crate::error::Result;
use crate::keyring::Keyring;
use crate::request::{Arguments, Principal};
use crate::scope::Scope;
use crate::store::TokenStore;
use crate::token::{now_epoch, Token, TokenId};
use std::time::Duration;
use tracing::{debug, info};

/// Default validity window for minted tokens, in seconds.
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Mints, evaluates, consumes, and revokes capability tokens.
#[derive(Debug)]
pub struct CapabilityEngine {
    keyring: Keyring,
    store: TokenStore,
}

impl CapabilityEngine {
    /// Build an engine around an injected keyring and store.
    pub fn new(keyring: Keyring, store: TokenStore) -> Self {
        Self { keyring, store }
    }

    /// Build an engine with a fresh empty store.
    pub fn with_keyring(keyring: Keyring) -> Self {
        Self::new(keyring, TokenStore::new())
    }

    /// The token registry, for host introspection (listing, direct
    /// store/sweep access). All store methods take `&self`.
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Mint, sign, and register a token for an approved action.
    ///
    /// The validity window starts now and runs for `ttl` (zero is legal
    /// and yields an instantly-expired token). The algorithm tag comes
    /// from the keyring, which must be able to sign.
    pub fn mint(
        &self,
        principal: &Principal,
        scope: Scope,
        issued_by: impl Into<String>,
        ttl: Duration,
        policy_id: Option<String>,
        single_use: bool,
    ) -> Result<Token> {
        let mut token = Token::issue(
            principal,
            scope,
            issued_by,
            ttl,
            policy_id,
            single_use,
            self.keyring.algorithm(),
        );
        token.signature = Some(self.keyring.sign(&token)?);
        self.store.store(token.clone());

        info!(
            token_id = %token.token_id,
            principal = %principal.sub,
            tool = %token.scope.tool_name,
            single_use = token.single_use,
            "minted capability token"
        );
        audit::log_event(
            AuditEvent::new(AuditEventType::TokenMinted)
                .with_token(token.token_id.as_str())
                .with_principal(&principal.sub)
                .with_tool(&token.scope.tool_name)
                .with_detail(format!(
                    "issued by {}, key {}",
                    token.issued_by,
                    self.keyring.fingerprint()
                )),
        );
        Ok(token)
    }

    /// Evaluate a request presenting an explicit token id.
    ///
    /// Unknown ids deny with `PCCAP_NOT_FOUND`; an already-consumed
    /// single-use token denies with `PCCAP_REPLAY` before any other
    /// check. On an `enforce` success, consumption is the final
    /// authority: losing the `mark_used` race converts the success into
    /// a replay denial.
    pub fn evaluate_with_token(
        &self,
        principal: &Principal,
        tool_name: &str,
        arguments: &Arguments,
        token_id: &TokenId,
    ) -> Verdict {
        let Some(token) = self.store.get(token_id) else {
            let verdict = Verdict::deny(
                ReasonCode::NotFound,
                format!("no token under id {}", token_id),
            );
            return self.record(principal, tool_name, Some(token_id), verdict);
        };

        if token.single_use && self.store.is_used(token_id) {
            let verdict = Verdict::deny(
                ReasonCode::Replay,
                format!("token {} already consumed", token_id),
            );
            return self.record(principal, tool_name, Some(token_id), verdict);
        }

        let mut verdict = enforce(principal, tool_name, arguments, &token, &self.keyring);
        if verdict.allowed() && token.single_use && !self.store.mark_used(token_id) {
            verdict = Verdict::deny(
                ReasonCode::Replay,
                format!("token {} consumed by a concurrent evaluation", token_id),
            );
        }
        self.record(principal, tool_name, Some(token_id), verdict)
    }

    /// Evaluate a request without an explicit token id by scanning the
    /// principal's active tokens.
    ///
    /// Candidates are visited in store insertion order; the first one
    /// that passes the full `enforce` check wins and is consumed under
    /// single-use semantics. Candidates failing enforcement are skipped.
    /// With no winner the request denies with `PCCAP_NO_TOKEN`.
    pub fn evaluate_auto(
        &self,
        principal: &Principal,
        tool_name: &str,
        arguments: &Arguments,
    ) -> Verdict {
        for token in self.store.list_for_principal(&principal.sub) {
            if token.scope.matches_request(tool_name, arguments).is_err() {
                continue;
            }
            let verdict = enforce(principal, tool_name, arguments, &token, &self.keyring);
            if !verdict.allowed() {
                continue;
            }
            if token.single_use && !self.store.mark_used(&token.token_id) {
                let verdict = Verdict::deny(
                    ReasonCode::Replay,
                    format!("token {} consumed by a concurrent evaluation", token.token_id),
                );
                return self.record(principal, tool_name, Some(&token.token_id), verdict);
            }
            return self.record(principal, tool_name, Some(&token.token_id), verdict);
        }

        let verdict = Verdict::deny(
            ReasonCode::NoToken,
            format!("no active token for '{}' covers {}", principal.sub, tool_name),
        );
        self.record(principal, tool_name, None, verdict)
    }

    /// Revoke a token outright. Idempotent; reports prior existence.
    pub fn revoke(&self, token_id: &TokenId) -> bool {
        let existed = self.store.revoke(token_id);
        if existed {
            info!(token_id = %token_id, "revoked capability token");
            audit::log_event(
                AuditEvent::new(AuditEventType::TokenRevoked).with_token(token_id.as_str()),
            );
        }
        existed
    }

    /// Sweep expired tokens out of the store. Returns the count removed.
    pub fn cleanup(&self) -> usize {
        let removed = self.store.cleanup_expired(now_epoch());
        if removed > 0 {
            debug!(removed, "swept expired capability tokens");
            audit::log_event(
                AuditEvent::new(AuditEventType::StoreCleanup)
                    .with_detail(format!("removed {} expired tokens", removed)),
            );
        }
        removed
    }

    /// Emit diagnostics for a decision and hand the verdict back.
    fn record(
        &self,
        principal: &Principal,
        tool_name: &str,
        token_id: Option<&TokenId>,
        verdict: Verdict,
    ) -> Verdict {
        debug!(
            principal = %principal.sub,
            tool = tool_name,
            code = verdict.code().as_str(),
            allowed = verdict.allowed(),
            "capability decision"
        );
        let event_type = if verdict.allowed() {
            AuditEventType::DecisionAllowed
        } else {
            AuditEventType::DecisionDenied
        };
        let mut event = AuditEvent::new(event_type)
            .with_principal(&principal.sub)
            .with_tool(tool_name)
            .with_code(verdict.code().as_str())
            .with_detail(verdict.reason());
        if let Some(id) = token_id {
            event = event.with_token(id.as_str());
        }
        audit::log_event(event);
        verdict
    }
}
