//! Error types for the PCCap core.
//!
//! Only *structural* failures live here: malformed tokens on the wire,
//! oversized payloads, bad key material, misuse of a keyring. A capability
//! check that fails is not an error — denials are normal outcomes and are
//! returned as [`Verdict`](crate::Verdict) values with a reason code.

use thiserror::Error;

/// Result type alias for PCCap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structural errors raised by construction, serialization, and key handling.
#[derive(Error, Debug)]
pub enum Error {
    /// Token or scope could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Incoming JSON could not be parsed into a token or scope.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Serialized token exceeds the wire size ceiling.
    #[error("token size {size} bytes exceeds maximum {max} bytes")]
    TokenTooLarge { size: usize, max: usize },

    /// Token identifier does not carry the expected prefix or shape.
    #[error("invalid token ID: {0}")]
    InvalidTokenId(String),

    /// The token's algorithm tag disagrees with the keyring asked to handle it.
    #[error("algorithm mismatch: token is tagged {token}, keyring provides {keyring}")]
    AlgorithmMismatch { token: String, keyring: String },

    /// A verify-only keyring was asked to produce a signature.
    #[error("keyring holds no signing key")]
    NoSigningKey,

    /// Key material could not be loaded or encoded.
    #[error("cryptographic error: {0}")]
    Crypto(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_context() {
        let err = Error::TokenTooLarge {
            size: 100_000,
            max: 65_536,
        };
        let msg = err.to_string();
        assert!(msg.contains("100000"));
        assert!(msg.contains("65536"));

        let err = Error::AlgorithmMismatch {
            token: "HS256".to_string(),
            keyring: "Ed25519".to_string(),
        };
        assert!(err.to_string().contains("HS256"));
        assert!(err.to_string().contains("Ed25519"));
    }

    #[test]
    fn invalid_token_id_names_the_offender() {
        let err = Error::InvalidTokenId("tok_abc".to_string());
        assert!(err.to_string().contains("tok_abc"));
    }
}
