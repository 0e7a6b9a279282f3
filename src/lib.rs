//! # PCCap
//!
//! Proof-Carrying Capabilities - signed permits for high-risk agent actions.
//!
//! A base policy engine classifies some tool calls as requiring explicit
//! approval and denies them by default. PCCap is the exception mechanism:
//! an approver mints a short-lived, narrowly-scoped, signed token, and the
//! request goes through only while a live token matching the principal,
//! the tool, and the concrete arguments is presented. Single-use tokens
//! are consumed atomically on first success, so an intercepted permit
//! cannot be replayed.
//!
//! ## Key Concepts
//!
//! - **Token**: a signed grant binding a principal to a scope within a
//!   validity window
//! - **Scope**: the constraint set a token enforces (tool, exact
//!   arguments, path prefix, size bound)
//! - **Verdict**: every evaluation yields exactly one allow/deny outcome
//!   with a stable `PCCAP_*` reason code — denials are values, not errors
//!
//! ## Example
//!
//! ```rust,ignore
//! use pccap::{CapabilityEngine, Keyring, Principal, Scope};
//! use std::time::Duration;
//!
//! let engine = CapabilityEngine::with_keyring(Keyring::generate_hmac());
//! let agent = Principal::agent("agent@example.com");
//!
//! // An approver grants one deletion under /tmp/scratch.
//! let token = engine.mint(
//!     &agent,
//!     Scope::fs_delete("/tmp/scratch"),
//!     "reviewer@example.com",
//!     Duration::from_secs(300),
//!     None,
//!     true,
//! )?;
//!
//! // The gateway evaluates the pending request against the token.
//! let verdict = engine.evaluate_with_token(&agent, "fs.delete", &args, &token.token_id);
//! assert!(verdict.allowed());
//! ```

pub mod audit;
pub mod enforce;
pub mod engine;
pub mod error;
pub mod keyring;
pub mod request;
pub mod scope;
pub mod store;
pub mod token;
pub mod wire;

// Re-exports for convenience
pub use enforce::{enforce, ReasonCode, Verdict};
pub use engine::{CapabilityEngine, DEFAULT_TTL_SECS};
pub use error::{Error, Result};
pub use keyring::Keyring;
pub use request::{ActorKind, ArgValue, Arguments, Principal};
pub use scope::{Scope, ScopeMismatch};
pub use store::TokenStore;
pub use token::{now_epoch, Algorithm, Token, TokenId, TOKEN_ID_PREFIX};
pub use wire::MAX_TOKEN_SIZE;

/// Context string for token signatures (prevents cross-protocol attacks).
///
/// All signatures are computed over: `SIGNATURE_CONTEXT || canonical_bytes`,
/// so a PCCap signature can never be mistaken for any other artifact
/// signed under the same key.
pub const SIGNATURE_CONTEXT: &[u8] = b"pccap-token-v1";
