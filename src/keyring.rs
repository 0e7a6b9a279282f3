//! Keyring: produces and checks token signatures.
//!
//! Two schemes are supported. HS256 (HMAC-SHA256) is the symmetric
//! default: one process-held secret both signs and verifies. Ed25519 is
//! the asymmetric option for deployments where the verifying side must
//! not be able to mint — a verify-only keyring holds just the public key.
//!
//! Every signature is computed over `SIGNATURE_CONTEXT || canonical_bytes`
//! so a token signature can never be confused with any other artifact
//! signed under the same key. The token's `algorithm` tag is part of the
//! signed bytes, and both [`Keyring::sign`] and [`Keyring::verify`] refuse
//! tokens whose tag disagrees with the keyring's own scheme.

use crate::error::{Error, Result};
use crate::token::{Algorithm, Token};
use crate::SIGNATURE_CONTEXT;
use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{
    Signature as Ed25519Signature, Signer, SigningKey as Ed25519SigningKey, Verifier, VerifyingKey,
};
use hmac::{Hmac, Mac};
use pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{CloneableSecret, ExposeSecret, Secret, Zeroize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// HMAC secret wrapped for `Secret`: zeroized on drop, never printed.
struct HmacSecret(Vec<u8>);

impl Clone for HmacSecret {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Zeroize for HmacSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl CloneableSecret for HmacSecret {}

// ed25519-dalek 2.x SigningKey zeroizes itself on Drop, so the wrapper's
// Zeroize is a no-op marker for Secret.
struct Ed25519KeyWrapper(Ed25519SigningKey);

impl Clone for Ed25519KeyWrapper {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Zeroize for Ed25519KeyWrapper {
    fn zeroize(&mut self) {}
}

impl CloneableSecret for Ed25519KeyWrapper {}

#[derive(Clone)]
enum KeyMaterial {
    Hmac(Secret<HmacSecret>),
    Ed25519 {
        signing: Secret<Ed25519KeyWrapper>,
        verifying: VerifyingKey,
    },
    Ed25519Verify(VerifyingKey),
}

/// Signer/verifier for capability tokens.
#[derive(Clone)]
pub struct Keyring {
    material: KeyMaterial,
}

// Custom Debug to match secrecy's behavior (redacted).
impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyring")
            .field("algorithm", &self.algorithm().as_str())
            .field("key", &"***SECRET***")
            .finish()
    }
}

impl Keyring {
    /// Generate an HS256 keyring with a fresh 32-byte random secret.
    pub fn generate_hmac() -> Self {
        let mut secret = vec![0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self {
            material: KeyMaterial::Hmac(Secret::new(HmacSecret(secret))),
        }
    }

    /// HS256 keyring over a caller-provided secret.
    ///
    /// Deterministic: two keyrings built from the same secret produce and
    /// accept the same signatures.
    pub fn hmac_from_secret(secret: &[u8]) -> Self {
        Self {
            material: KeyMaterial::Hmac(Secret::new(HmacSecret(secret.to_vec()))),
        }
    }

    /// Generate a fresh Ed25519 keyring.
    pub fn generate_ed25519() -> Self {
        let signing = Ed25519SigningKey::generate(&mut OsRng);
        let verifying = signing.verifying_key();
        Self {
            material: KeyMaterial::Ed25519 {
                signing: Secret::new(Ed25519KeyWrapper(signing)),
                verifying,
            },
        }
    }

    /// Load an Ed25519 signing keyring from a PKCS#8 PEM string.
    pub fn ed25519_from_pem(pem: &str) -> Result<Self> {
        let signing = Ed25519SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| Error::Crypto(format!("invalid PEM: {}", e)))?;
        let verifying = signing.verifying_key();
        Ok(Self {
            material: KeyMaterial::Ed25519 {
                signing: Secret::new(Ed25519KeyWrapper(signing)),
                verifying,
            },
        })
    }

    /// Export the Ed25519 signing key as PKCS#8 PEM, for host key storage.
    ///
    /// Fails on HS256 and verify-only keyrings.
    pub fn ed25519_to_pem(&self) -> Result<String> {
        match &self.material {
            KeyMaterial::Ed25519 { signing, .. } => signing
                .expose_secret()
                .0
                .to_pkcs8_pem(LineEnding::LF)
                .map(|pem| pem.to_string())
                .map_err(|e| Error::Crypto(format!("PEM encoding failed: {}", e))),
            KeyMaterial::Ed25519Verify(_) => Err(Error::NoSigningKey),
            KeyMaterial::Hmac(_) => Err(Error::Crypto(
                "HS256 keyrings have no PEM representation".to_string(),
            )),
        }
    }

    /// Verify-only Ed25519 keyring from raw public key bytes.
    ///
    /// The resulting keyring accepts tokens signed by the matching private
    /// key but cannot mint any itself.
    pub fn ed25519_verifier(public_key: &[u8; 32]) -> Result<Self> {
        let verifying = VerifyingKey::from_bytes(public_key)
            .map_err(|e| Error::Crypto(format!("invalid public key: {}", e)))?;
        Ok(Self {
            material: KeyMaterial::Ed25519Verify(verifying),
        })
    }

    /// The algorithm this keyring signs and accepts.
    pub fn algorithm(&self) -> Algorithm {
        match self.material {
            KeyMaterial::Hmac(_) => Algorithm::Hs256,
            KeyMaterial::Ed25519 { .. } | KeyMaterial::Ed25519Verify(_) => Algorithm::Ed25519,
        }
    }

    /// Whether this keyring can produce signatures.
    pub fn can_sign(&self) -> bool {
        !matches!(self.material, KeyMaterial::Ed25519Verify(_))
    }

    /// Ed25519 public key bytes, if this keyring is asymmetric.
    pub fn public_key_bytes(&self) -> Option<[u8; 32]> {
        match &self.material {
            KeyMaterial::Ed25519 { verifying, .. } | KeyMaterial::Ed25519Verify(verifying) => {
                Some(verifying.to_bytes())
            }
            KeyMaterial::Hmac(_) => None,
        }
    }

    /// Short hex key identifier for audit logs and receipts.
    ///
    /// First 8 bytes of the public key (Ed25519) or of the SHA-256 of the
    /// secret (HS256). Never reveals key material.
    pub fn fingerprint(&self) -> String {
        match &self.material {
            KeyMaterial::Hmac(secret) => {
                let digest = Sha256::digest(&secret.expose_secret().0);
                hex::encode(&digest[..8])
            }
            KeyMaterial::Ed25519 { verifying, .. } | KeyMaterial::Ed25519Verify(verifying) => {
                hex::encode(&verifying.to_bytes()[..8])
            }
        }
    }

    /// Sign a token's canonical bytes, returning the encoded signature.
    ///
    /// The token's `algorithm` tag must already name this keyring's
    /// scheme; the tag is covered by the signature.
    pub fn sign(&self, token: &Token) -> Result<String> {
        if token.algorithm != self.algorithm() {
            return Err(Error::AlgorithmMismatch {
                token: token.algorithm.to_string(),
                keyring: self.algorithm().to_string(),
            });
        }
        let message = prefix_message(&token.canonical_bytes()?);
        let raw = match &self.material {
            KeyMaterial::Hmac(secret) => {
                let mut mac = HmacSha256::new_from_slice(&secret.expose_secret().0)
                    .map_err(|e| Error::Crypto(format!("invalid HMAC key: {}", e)))?;
                mac.update(&message);
                mac.finalize().into_bytes().to_vec()
            }
            KeyMaterial::Ed25519 { signing, .. } => {
                signing.expose_secret().0.sign(&message).to_bytes().to_vec()
            }
            KeyMaterial::Ed25519Verify(_) => return Err(Error::NoSigningKey),
        };
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(raw))
    }

    /// Check a token's signature against its *current* field values.
    ///
    /// Total: returns false — never errors — when the signature is absent,
    /// the algorithm tag disagrees, the stored value fails to decode, or
    /// the recomputed signature does not match. HS256 comparison is
    /// constant-time.
    pub fn verify(&self, token: &Token) -> bool {
        let Some(stored) = token.signature.as_deref() else {
            return false;
        };
        if token.algorithm != self.algorithm() {
            return false;
        }
        let Ok(canonical) = token.canonical_bytes() else {
            return false;
        };
        let message = prefix_message(&canonical);
        let Ok(stored_raw) = general_purpose::URL_SAFE_NO_PAD.decode(stored) else {
            return false;
        };

        match &self.material {
            KeyMaterial::Hmac(secret) => {
                let Ok(mut mac) = HmacSha256::new_from_slice(&secret.expose_secret().0) else {
                    return false;
                };
                mac.update(&message);
                let expected = mac.finalize().into_bytes();
                bool::from(expected.as_slice().ct_eq(&stored_raw))
            }
            KeyMaterial::Ed25519 { verifying, .. } | KeyMaterial::Ed25519Verify(verifying) => {
                let Ok(sig_bytes) = <[u8; 64]>::try_from(stored_raw.as_slice()) else {
                    return false;
                };
                let signature = Ed25519Signature::from_bytes(&sig_bytes);
                verifying.verify(&message, &signature).is_ok()
            }
        }
    }
}

/// Prefix a message with the context string for domain separation.
fn prefix_message(message: &[u8]) -> Vec<u8> {
    let mut prefixed = Vec::with_capacity(SIGNATURE_CONTEXT.len() + message.len());
    prefixed.extend_from_slice(SIGNATURE_CONTEXT);
    prefixed.extend_from_slice(message);
    prefixed
}
