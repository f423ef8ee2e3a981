//! Argon2id password hashing and verification.
//!
//! Hashes are stored as PHC strings, so the algorithm parameters and salt
//! travel with the hash itself.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use std::sync::LazyLock;

// Hash of a throwaway secret, generated once per process.
static UNKNOWN_USER_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("unknown-user-placeholder").ok());

/// Hash a plaintext password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored PHC hash.
///
/// `Ok(false)` means the password is wrong. `Err` means the stored hash could
/// not be parsed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

/// verify_unknown_user
///
/// Spends one Argon2 verification, the same work as checking a real account,
/// and always reports a mismatch. Used when the user name does not exist.
pub fn verify_unknown_user(password: &str) -> bool {
    if let Some(hash) = UNKNOWN_USER_HASH.as_deref() {
        let _ = std::hint::black_box(verify_password(password, hash));
    }
    false
}

/// Builds the placeholder hash ahead of the first login.
pub fn prime_unknown_user_hash() {
    LazyLock::force(&UNKNOWN_USER_HASH);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("jefe-maestro-117").expect("hashing should succeed");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("jefe-maestro-117", &hash).unwrap());
    }

    #[test]
    fn wrong_password_is_false_not_error() {
        let hash = hash_password("cortana").expect("hashing should succeed");
        assert_eq!(verify_password("halsey", &hash).unwrap(), false);
    }

    #[test]
    fn unknown_user_never_matches_even_the_placeholder() {
        prime_unknown_user_hash();
        assert!(UNKNOWN_USER_HASH.is_some());
        assert!(!verify_unknown_user("unknown-user-placeholder"));
        assert!(!verify_unknown_user("anything"));
    }

    #[test]
    fn garbage_hash_is_an_error() {
        assert!(verify_password("x", "not-a-phc-string").is_err());
    }
}
