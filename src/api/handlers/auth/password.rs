//! Argon2id password hashing and verification.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;

// Stand-in hash verified when no account matches, so an unknown email costs
// the same Argon2 work as a wrong password.
static DECOY_HASH: Lazy<String> =
    Lazy::new(|| hash_password("decoy-credential").unwrap_or_default());

/// Hash a plaintext password into a PHC string suitable for storage.
pub(super) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored PHC string.
///
/// Argon2 verification is constant-time with respect to the password; a
/// malformed stored hash is treated as a mismatch rather than an error so
/// the caller sees one failure shape.
pub(super) fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Burn one full verification against a decoy hash. Called on the
/// account-miss path so response timing does not reveal whether the email
/// exists.
pub(super) fn verify_decoy(password: &str) {
    let _ = verify_password(password, &DECOY_HASH);
}
