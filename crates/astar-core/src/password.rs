//! Password hashing for configured users.
//!
//! New hashes are Argon2id PHC strings (`$argon2id$v=19$...`). Hashes written
//! by earlier releases, `sha256$<salt>$<base64 digest>`, still verify and are
//! reported by [`needs_rehash`] so `astar config validate` can flag them.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::{AstarError, Result};

const LEGACY_PREFIX: &str = "sha256$";

/// Argon2id with the crate's default cost parameters and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AstarError::PasswordHash(e.to_string()))
}

/// Check `password` against a stored hash. Unreadable hashes never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if let Some(rest) = stored.strip_prefix(LEGACY_PREFIX) {
        return verify_legacy(password, rest);
    }
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "unreadable password hash");
            false
        }
    }
}

/// True for hashes in the legacy SHA-256 format.
pub fn needs_rehash(stored: &str) -> bool {
    stored.starts_with(LEGACY_PREFIX)
}

/// True when `stored` is a PHC string or a well-formed legacy hash.
pub fn is_recognized(stored: &str) -> bool {
    match stored.strip_prefix(LEGACY_PREFIX) {
        Some(rest) => rest.split_once('$').is_some_and(|(salt, digest)| {
            !salt.is_empty() && STANDARD.decode(digest).is_ok_and(|d| d.len() == 32)
        }),
        None => PasswordHash::new(stored).is_ok(),
    }
}

fn legacy_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}

fn verify_legacy(password: &str, salt_and_digest: &str) -> bool {
    let Some((salt, expected)) = salt_and_digest.split_once('$') else {
        return false;
    };
    let actual = legacy_digest(salt, password);
    bool::from(actual.as_bytes().ct_eq(expected.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_hash(salt: &str, password: &str) -> String {
        format!("{LEGACY_PREFIX}{salt}${}", legacy_digest(salt, password))
    }

    #[test]
    fn verify_accepts_matching_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!needs_rehash(&hash));
        assert!(is_recognized(&hash));
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("pw").unwrap(), hash_password("pw").unwrap());
    }

    #[test]
    fn legacy_hashes_still_verify() {
        let hash = legacy_hash("c2FsdA==", "pw");
        assert!(verify_password("pw", &hash));
        assert!(!verify_password("other", &hash));
        assert!(needs_rehash(&hash));
        assert!(is_recognized(&hash));
    }

    #[test]
    fn truncated_legacy_digest_is_rejected() {
        let mut hash = legacy_hash("salt", "pw");
        hash.pop();
        assert!(!verify_password("pw", &hash));
        assert!(!verify_password("pw", "sha256$no-separator"));
    }

    #[test]
    fn garbage_never_matches() {
        for stored in ["", "plaintext", "$argon2id$broken", "sha256$$"] {
            assert!(!verify_password("", stored), "'{stored}' matched");
            assert!(!is_recognized(stored), "'{stored}' recognized");
        }
    }
}
