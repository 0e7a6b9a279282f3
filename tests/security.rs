//! Security tests for PCCap.
//!
//! These tests verify that the classic attacks on capability tokens are
//! properly mitigated:
//! - Path traversal and prefix confusion
//! - Token forgery and field tampering
//! - Key and algorithm confusion
//! - Replay of single-use tokens, including under concurrency

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use pccap::{
    wire, Algorithm, ArgValue, Arguments, CapabilityEngine, Error, Keyring, Principal, ReasonCode,
    Scope, Token, MAX_TOKEN_SIZE,
};

fn delete_args(path: &str) -> Arguments {
    let mut args = Arguments::new();
    args.insert("path".to_string(), ArgValue::from(path));
    args
}

fn scratch_engine() -> (CapabilityEngine, Principal, Token) {
    let engine = CapabilityEngine::with_keyring(Keyring::generate_hmac());
    let principal = Principal::agent("agent@test.com");
    let token = engine
        .mint(
            &principal,
            Scope::fs_delete("/tmp/scratch"),
            "orchestrator",
            Duration::from_secs(300),
            None,
            false,
        )
        .unwrap();
    (engine, principal, token)
}

// ============================================================================
// Path Confinement
// ============================================================================

/// Verify that dot-dot segments never satisfy a prefix scope.
///
/// Attack: `/tmp/scratch/../../etc/shadow` points under the prefix
/// textually but escapes it after resolution.
/// Expected: Rejected.
#[test]
fn test_path_traversal_rejected() {
    let (engine, principal, token) = scratch_engine();

    let verdict = engine.evaluate_with_token(
        &principal,
        "fs.delete",
        &delete_args("/tmp/scratch/../../etc/shadow"),
        &token.token_id,
    );
    assert!(!verdict.allowed(), "traversal path must be rejected");
    assert_eq!(verdict.code(), ReasonCode::ScopeMismatch);
}

/// Verify that backslash-separated traversal is caught too.
///
/// Attack: smuggle `..` past a forward-slash-only check with `\`.
/// Expected: Rejected.
#[test]
fn test_backslash_traversal_rejected() {
    let (engine, principal, token) = scratch_engine();

    let verdict = engine.evaluate_with_token(
        &principal,
        "fs.delete",
        &delete_args("/tmp/scratch\\..\\..\\etc\\shadow"),
        &token.token_id,
    );
    assert!(!verdict.allowed());
    assert_eq!(verdict.code(), ReasonCode::ScopeMismatch);
}

/// Verify that a sibling directory sharing the prefix string is outside
/// the scope.
///
/// Attack: `/tmp/scratchy/file` starts with the bytes `/tmp/scratch`.
/// Expected: Rejected (prefix matching is component-wise).
#[test]
fn test_sibling_prefix_rejected() {
    let (engine, principal, token) = scratch_engine();

    let verdict = engine.evaluate_with_token(
        &principal,
        "fs.delete",
        &delete_args("/tmp/scratchy/file"),
        &token.token_id,
    );
    assert!(!verdict.allowed(), "sibling directory must not match");
    assert_eq!(verdict.code(), ReasonCode::ScopeMismatch);
}

/// Verify that relative paths cannot satisfy an absolute prefix.
///
/// Attack: present `scratch/file` and hope the checker resolves it
/// against a convenient working directory.
/// Expected: Rejected (relative paths are unresolvable, never a match).
#[test]
fn test_relative_path_rejected() {
    let (engine, principal, token) = scratch_engine();

    let verdict = engine.evaluate_with_token(
        &principal,
        "fs.delete",
        &delete_args("scratch/file"),
        &token.token_id,
    );
    assert!(!verdict.allowed());
    assert_eq!(verdict.code(), ReasonCode::ScopeMismatch);
}

/// Verify that NUL bytes in paths are rejected outright.
///
/// Attack: `/tmp/scratch/ok\0hidden` truncates differently in C code
/// downstream.
/// Expected: Rejected.
#[test]
fn test_nul_byte_path_rejected() {
    let (engine, principal, token) = scratch_engine();

    let verdict = engine.evaluate_with_token(
        &principal,
        "fs.delete",
        &delete_args("/tmp/scratch/ok\0hidden"),
        &token.token_id,
    );
    assert!(!verdict.allowed());
    assert_eq!(verdict.code(), ReasonCode::ScopeMismatch);
}

// ============================================================================
// Token Forgery and Tampering
// ============================================================================

/// Verify that a token signed under an attacker's key is rejected.
///
/// Attack: mint a structurally perfect token under a key the attacker
/// controls and slip it into the store.
/// Expected: Rejected (signature check uses the engine's keyring).
#[test]
fn test_forged_token_rejected() {
    let engine = CapabilityEngine::with_keyring(Keyring::generate_hmac());
    let principal = Principal::agent("agent@test.com");

    let attacker_keyring = Keyring::generate_hmac();
    let mut forged = Token::issue(
        &principal,
        Scope::fs_delete("/"),
        "attacker",
        Duration::from_secs(300),
        None,
        false,
        Algorithm::Hs256,
    );
    forged.signature = Some(attacker_keyring.sign(&forged).unwrap());
    let forged_id = forged.token_id.clone();
    engine.store().store(forged);

    let verdict = engine.evaluate_with_token(
        &principal,
        "fs.delete",
        &delete_args("/etc/passwd"),
        &forged_id,
    );
    assert!(!verdict.allowed(), "forged token must be rejected");
    assert_eq!(verdict.code(), ReasonCode::SignatureInvalid);
}

/// Verify that an unsigned token never authorizes anything.
#[test]
fn test_unsigned_token_rejected() {
    let engine = CapabilityEngine::with_keyring(Keyring::generate_hmac());
    let principal = Principal::agent("agent@test.com");

    let bare = Token::issue(
        &principal,
        Scope::fs_delete("/tmp/scratch"),
        "orchestrator",
        Duration::from_secs(300),
        None,
        false,
        Algorithm::Hs256,
    );
    let bare_id = bare.token_id.clone();
    engine.store().store(bare);

    let verdict = engine.evaluate_with_token(
        &principal,
        "fs.delete",
        &delete_args("/tmp/scratch/file"),
        &bare_id,
    );
    assert!(!verdict.allowed());
    assert_eq!(verdict.code(), ReasonCode::SignatureInvalid);
}

/// Verify that widening the scope after signing invalidates the token.
///
/// Attack: edit `path_prefix` from `/tmp/scratch` to `/` in transit.
/// Expected: Rejected.
#[test]
fn test_scope_widening_invalidates_signature() {
    let (engine, principal, token) = scratch_engine();

    let mut widened = engine.store().get(&token.token_id).unwrap();
    widened.scope.path_prefix = Some("/".to_string());
    engine.store().store(widened);

    let verdict = engine.evaluate_with_token(
        &principal,
        "fs.delete",
        &delete_args("/etc/passwd"),
        &token.token_id,
    );
    assert!(!verdict.allowed(), "widened scope must fail verification");
    assert_eq!(verdict.code(), ReasonCode::SignatureInvalid);
}

/// Verify that extending the lifetime after signing invalidates the token.
///
/// Attack: push `expires_at` a year into the future.
/// Expected: the expiry check passes on the tampered value, but the
/// signature check catches the edit.
#[test]
fn test_expiry_extension_invalidates_signature() {
    let (engine, principal, token) = scratch_engine();

    let mut extended = engine.store().get(&token.token_id).unwrap();
    extended.expires_at += 365.0 * 86_400.0;
    engine.store().store(extended);

    let verdict = engine.evaluate_with_token(
        &principal,
        "fs.delete",
        &delete_args("/tmp/scratch/file"),
        &token.token_id,
    );
    assert!(!verdict.allowed());
    assert_eq!(verdict.code(), ReasonCode::SignatureInvalid);
}

/// Verify that every signed field is covered by the signature.
///
/// Attack: flip one field at a time and present the rest unchanged.
/// Expected: verification fails for each mutation.
#[test]
fn test_any_field_tampering_fails_verification() {
    let keyring = Keyring::generate_hmac();
    let mut token = Token::issue(
        &Principal::agent("agent@test.com"),
        Scope::fs_delete("/tmp/scratch"),
        "orchestrator",
        Duration::from_secs(300),
        Some("pol_baseline".to_string()),
        true,
        Algorithm::Hs256,
    );
    token.signature = Some(keyring.sign(&token).unwrap());
    assert!(keyring.verify(&token), "untampered token must verify");

    let mutations: Vec<(&str, Box<dyn Fn(&mut Token)>)> = vec![
        ("principal_sub", Box::new(|t| t.principal_sub = "evil@test.com".to_string())),
        ("scope.tool_name", Box::new(|t| t.scope.tool_name = "fs.read".to_string())),
        ("scope.path_prefix", Box::new(|t| t.scope.path_prefix = Some("/".to_string()))),
        ("issued_by", Box::new(|t| t.issued_by = "attacker".to_string())),
        ("issued_at", Box::new(|t| t.issued_at -= 60.0)),
        ("expires_at", Box::new(|t| t.expires_at += 3_600.0)),
        ("policy_id", Box::new(|t| t.policy_id = None)),
        ("single_use", Box::new(|t| t.single_use = false)),
        ("nonce", Box::new(|t| t.nonce = "AAAAAAAAAAAAAAAAAAAAAA".to_string())),
    ];

    for (field, mutate) in &mutations {
        let mut tampered = token.clone();
        mutate(&mut tampered);
        assert!(
            !keyring.verify(&tampered),
            "tampering {} must fail verification",
            field
        );
    }

    // The original still verifies after all that.
    assert!(keyring.verify(&token));
}

// ============================================================================
// Key and Algorithm Confusion
// ============================================================================

/// Verify that tokens do not verify under a different HMAC secret.
#[test]
fn test_wrong_hmac_secret_rejected() {
    let signer = Keyring::hmac_from_secret(b"secret-one-secret-one-secret-one");
    let other = Keyring::hmac_from_secret(b"secret-two-secret-two-secret-two");

    let mut token = Token::issue(
        &Principal::agent("agent@test.com"),
        Scope::fs_delete("/tmp/scratch"),
        "orchestrator",
        Duration::from_secs(300),
        None,
        false,
        Algorithm::Hs256,
    );
    token.signature = Some(signer.sign(&token).unwrap());

    assert!(signer.verify(&token));
    assert!(!other.verify(&token), "wrong secret must not verify");
}

/// Verify that tokens do not verify under a different Ed25519 key.
#[test]
fn test_wrong_ed25519_key_rejected() {
    let signer = Keyring::generate_ed25519();
    let other = Keyring::generate_ed25519();

    let mut token = Token::issue(
        &Principal::agent("agent@test.com"),
        Scope::fs_delete("/tmp/scratch"),
        "orchestrator",
        Duration::from_secs(300),
        None,
        false,
        Algorithm::Ed25519,
    );
    token.signature = Some(signer.sign(&token).unwrap());

    assert!(signer.verify(&token));
    assert!(!other.verify(&token), "wrong key must not verify");
}

/// Verify that relabeling the algorithm field defeats neither keyring.
///
/// Attack: take an HS256-signed token and flip its tag to Ed25519 to
/// route it to a more permissive verifier.
/// Expected: Rejected by both, since the tag itself is signed and each
/// keyring refuses foreign tags.
#[test]
fn test_algorithm_confusion_rejected() {
    let hmac = Keyring::generate_hmac();
    let ed = Keyring::generate_ed25519();

    let mut token = Token::issue(
        &Principal::agent("agent@test.com"),
        Scope::fs_delete("/tmp/scratch"),
        "orchestrator",
        Duration::from_secs(300),
        None,
        false,
        Algorithm::Hs256,
    );
    token.signature = Some(hmac.sign(&token).unwrap());

    let mut relabeled = token.clone();
    relabeled.algorithm = Algorithm::Ed25519;

    assert!(!hmac.verify(&relabeled), "hmac keyring must refuse the foreign tag");
    assert!(!ed.verify(&relabeled), "signature is not a valid ed25519 signature");
}

/// Verify that an engine keyed for Ed25519 rejects HS256 tokens that
/// land in its store.
#[test]
fn test_cross_algorithm_token_rejected_by_engine() {
    let engine = CapabilityEngine::with_keyring(Keyring::generate_ed25519());
    let principal = Principal::agent("agent@test.com");

    let hmac = Keyring::generate_hmac();
    let mut stray = Token::issue(
        &principal,
        Scope::fs_delete("/tmp/scratch"),
        "orchestrator",
        Duration::from_secs(300),
        None,
        false,
        Algorithm::Hs256,
    );
    stray.signature = Some(hmac.sign(&stray).unwrap());
    let stray_id = stray.token_id.clone();
    engine.store().store(stray);

    let verdict = engine.evaluate_with_token(
        &principal,
        "fs.delete",
        &delete_args("/tmp/scratch/file"),
        &stray_id,
    );
    assert!(!verdict.allowed());
    assert_eq!(verdict.code(), ReasonCode::SignatureInvalid);
}

// ============================================================================
// Size Limits
// ============================================================================

/// Verify that content over the scope's byte limit is refused, and that
/// content exactly at the limit is not.
#[test]
fn test_oversized_content_rejected() {
    let engine = CapabilityEngine::with_keyring(Keyring::generate_hmac());
    let principal = Principal::agent("agent@test.com");
    let token = engine
        .mint(
            &principal,
            Scope::new("fs.write").with_max_bytes(50),
            "orchestrator",
            Duration::from_secs(300),
            None,
            false,
        )
        .unwrap();

    let mut args = Arguments::new();
    args.insert("content".to_string(), ArgValue::from("x".repeat(51)));
    let verdict = engine.evaluate_with_token(&principal, "fs.write", &args, &token.token_id);
    assert!(!verdict.allowed());
    assert_eq!(verdict.code(), ReasonCode::ScopeMismatch);

    let mut ok_args = Arguments::new();
    ok_args.insert("content".to_string(), ArgValue::from("x".repeat(50)));
    let verdict = engine.evaluate_with_token(&principal, "fs.write", &ok_args, &token.token_id);
    assert!(verdict.allowed());
}

/// Verify that a decoy empty `content` cannot mask an oversized payload.
///
/// Attack: send `content: ""` to satisfy the byte limit while the real
/// payload rides under `data`.
/// Expected: the `data` value is bounded and the request is denied.
#[test]
fn test_empty_content_does_not_mask_oversized_data() {
    let engine = CapabilityEngine::with_keyring(Keyring::generate_hmac());
    let principal = Principal::agent("agent@test.com");
    let token = engine
        .mint(
            &principal,
            Scope::new("fs.write").with_max_bytes(10),
            "orchestrator",
            Duration::from_secs(300),
            None,
            false,
        )
        .unwrap();

    let mut args = Arguments::new();
    args.insert("content".to_string(), ArgValue::from(""));
    args.insert("data".to_string(), ArgValue::from("X".repeat(1000)));
    let verdict = engine.evaluate_with_token(&principal, "fs.write", &args, &token.token_id);
    assert!(
        !verdict.allowed(),
        "oversized data must not hide behind empty content"
    );
    assert_eq!(verdict.code(), ReasonCode::ScopeMismatch);
}

/// Verify that grotesquely large wire payloads are refused before parsing.
///
/// Attack: feed a multi-megabyte "token" to exhaust the decoder.
/// Expected: Rejected by the size gate, not by serde.
#[test]
fn test_oversized_wire_payload_rejected() {
    let blob = "x".repeat(MAX_TOKEN_SIZE + 1);
    let err = wire::decode(&blob).unwrap_err();
    assert!(matches!(err, Error::TokenTooLarge { .. }));
}

// ============================================================================
// Replay Under Concurrency
// ============================================================================

/// Verify that a single-use token admits exactly one of many racing
/// evaluations.
///
/// Attack: present the same single-use token from many threads at once,
/// hoping two check-then-consume sequences interleave.
/// Expected: one PCCAP_VALID, every other thread sees PCCAP_REPLAY.
#[test]
fn test_concurrent_single_use_grants_exactly_once() {
    let engine = Arc::new(CapabilityEngine::with_keyring(Keyring::generate_hmac()));
    let principal = Principal::agent("agent@test.com");
    let token = engine
        .mint(
            &principal,
            Scope::fs_delete("/tmp/scratch"),
            "orchestrator",
            Duration::from_secs(300),
            None,
            true,
        )
        .unwrap();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let engine = engine.clone();
        let barrier = barrier.clone();
        let principal = principal.clone();
        let token_id = token.token_id.clone();
        handles.push(thread::spawn(move || {
            let args = delete_args("/tmp/scratch/file");
            barrier.wait();
            engine.evaluate_with_token(&principal, "fs.delete", &args, &token_id)
        }));
    }

    let verdicts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let allowed = verdicts.iter().filter(|v| v.allowed()).count();
    assert_eq!(allowed, 1, "exactly one racer may spend the token");
    for verdict in verdicts.iter().filter(|v| !v.allowed()) {
        assert_eq!(verdict.code(), ReasonCode::Replay);
    }
}
