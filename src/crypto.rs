//! Voucher code generation and hashing.
//!
//! Plaintext codes only exist in memory: at issue time (returned once to the
//! issuer) and at redemption time (submitted by the guardian). The store keeps
//! a salted SHA-256 digest plus a short, lossy lookup key that narrows the
//! candidate set during redemption.

use rand::{Rng, RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

/// Characters a voucher code is drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Number of characters in a voucher code.
pub const CODE_LENGTH: usize = 8;

/// Random bytes per voucher salt (hex-encoded when stored).
pub const SALT_BYTES: usize = 16;

/// Hex characters kept from the lookup digest. 16 bits spreads codes over
/// 65536 buckets while staying far too short to recover a code from.
pub const LOOKUP_KEY_LEN: usize = 4;

/// Generate a voucher code from the OS CSPRNG.
pub fn generate_code() -> String {
    let mut rng = OsRng;
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Generate a hex-encoded random salt.
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut salt);
    hex::encode(salt)
}

/// SHA-256 over `salt || code`, hex-encoded.
pub fn hash_code(salt: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Bucket key used to find redemption candidates without a full scan.
pub fn lookup_key(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"learnpass-voucher-lookup-v1:");
    hasher.update(code.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..LOOKUP_KEY_LEN].to_string()
}

/// Recompute the salted hash for `code` and compare it to `expected_hash`
/// in constant time.
pub fn verify_code(salt: &str, code: &str, expected_hash: &str) -> bool {
    let computed = hash_code(salt, code);
    computed.as_bytes().ct_eq(expected_hash.as_bytes()).into()
}

/// Normalize a user-entered code: drop whitespace and `-` group separators,
/// uppercase, then check it against the alphabet and length.
pub fn normalize_code(input: &str) -> Result<String> {
    let code: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if code.len() != CODE_LENGTH || !code.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
        return Err(AppError::Validation(format!(
            "Voucher code must be {} characters (A-Z, 0-9)",
            CODE_LENGTH
        )));
    }

    Ok(code)
}

/// Render a code as `XXXX-XXXX` for display.
pub fn format_code(code: &str) -> String {
    if code.len() != CODE_LENGTH || !code.is_ascii() {
        return code.to_string();
    }
    let (head, tail) = code.split_at(CODE_LENGTH / 2);
    format!("{}-{}", head, tail)
}
