//! In-memory registry of issued and consumed tokens.
//!
//! Single-process only: nothing here is durable or transaction-safe
//! across processes. The issued map and the consumed set are independent
//! structures guarded by one lock, so `mark_used` is an atomic
//! test-and-set — the entire replay-protection story hangs on that.
//!
//! Lock acquisition never panics: a poisoned lock degrades to the
//! deny-safe answer (lookups miss, `mark_used` reports already-consumed).

use crate::token::{now_epoch, Token, TokenId};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct StoreInner {
    /// Issued tokens by id. Issue does not imply live: entries stay here
    /// until revoked or swept, even once consumed or expired.
    tokens: HashMap<TokenId, Token>,
    /// Ids in first-insertion order, for deterministic listing.
    order: Vec<TokenId>,
    /// Ids that have satisfied a single-use enforcement.
    used: HashSet<TokenId>,
}

/// Mutable token registry shared behind the engine.
///
/// All methods take `&self`; interior mutability keeps the store shareable
/// across concurrent evaluations.
#[derive(Debug, Default)]
pub struct TokenStore {
    inner: RwLock<StoreInner>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite by token id.
    ///
    /// Overwriting keeps the id's original listing position.
    pub fn store(&self, token: Token) {
        if let Ok(mut inner) = self.inner.write() {
            let id = token.token_id.clone();
            if inner.tokens.insert(id.clone(), token).is_none() {
                inner.order.push(id);
            }
        }
    }

    /// Look up a token by id.
    pub fn get(&self, token_id: &TokenId) -> Option<Token> {
        if let Ok(inner) = self.inner.read() {
            inner.tokens.get(token_id).cloned()
        } else {
            None
        }
    }

    /// Remove a token from the issued map and the consumed set.
    ///
    /// Idempotent; reports whether the token existed.
    pub fn revoke(&self, token_id: &TokenId) -> bool {
        if let Ok(mut inner) = self.inner.write() {
            let existed = inner.tokens.remove(token_id).is_some();
            inner.used.remove(token_id);
            if existed {
                inner.order.retain(|id| id != token_id);
            }
            existed
        } else {
            false
        }
    }

    /// Record a single-use consumption: first caller wins.
    ///
    /// Returns true only for the caller that actually consumed the token;
    /// every concurrent or later caller sees false. This is the sole
    /// mutation behind replay protection.
    pub fn mark_used(&self, token_id: &TokenId) -> bool {
        if let Ok(mut inner) = self.inner.write() {
            inner.used.insert(token_id.clone())
        } else {
            false
        }
    }

    /// Whether a token id has been consumed.
    pub fn is_used(&self, token_id: &TokenId) -> bool {
        if let Ok(inner) = self.inner.read() {
            inner.used.contains(token_id)
        } else {
            true
        }
    }

    /// Sweep tokens expired relative to `now` out of both the issued map
    /// and the consumed set. Returns the number removed.
    ///
    /// Never touches unexpired tokens, consumed or not.
    pub fn cleanup_expired(&self, now: f64) -> usize {
        if let Ok(mut inner) = self.inner.write() {
            let expired: Vec<TokenId> = inner
                .tokens
                .iter()
                .filter(|(_, t)| t.is_expired_at(now))
                .map(|(id, _)| id.clone())
                .collect();
            for id in &expired {
                inner.tokens.remove(id);
                inner.used.remove(id);
            }
            if !expired.is_empty() {
                inner.order.retain(|id| !expired.contains(id));
            }
            expired.len()
        } else {
            0
        }
    }

    /// Active tokens bound to `sub`: not expired, not consumed, in
    /// first-insertion order.
    pub fn list_for_principal(&self, sub: &str) -> Vec<Token> {
        let now = now_epoch();
        if let Ok(inner) = self.inner.read() {
            inner
                .order
                .iter()
                .filter_map(|id| inner.tokens.get(id))
                .filter(|t| {
                    t.principal_sub == sub
                        && !t.is_expired_at(now)
                        && !inner.used.contains(&t.token_id)
                })
                .cloned()
                .collect()
        } else {
            Vec::new()
        }
    }

    /// Number of issued tokens currently held (consumed ones included).
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.tokens.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
