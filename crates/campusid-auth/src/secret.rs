//! Client secret generation and verification.
//!
//! # Security
//!
//! - Secrets are 256-bit random values (32 bytes), base64url-encoded
//! - Hashing uses Argon2id (hybrid mode) with default parameters
//! - Salts are generated using OsRng (cryptographically secure RNG)
//! - Verification runs the full hash regardless of input, so timing does
//!   not reveal where a candidate diverged

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Generates a new cryptographically secure client secret.
#[must_use]
pub fn generate_client_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hashes a client secret for storage on an authentication record.
///
/// Returns a PHC-formatted Argon2id hash string.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails (rare).
pub fn hash_client_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verifies a presented secret against a stored hash.
///
/// A mismatching secret returns `Ok(false)`; only a malformed stored hash
/// is an error.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if the stored hash does not
/// parse.
pub fn verify_client_secret(
    secret: &str,
    stored_hash: &str,
) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(stored_hash)?;
    match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique() {
        assert_ne!(generate_client_secret(), generate_client_secret());
    }

    #[test]
    fn test_hash_and_verify() {
        let secret = generate_client_secret();
        let hash = hash_client_secret(&secret).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_client_secret(&secret, &hash).unwrap());
        assert!(!verify_client_secret("wrong", &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(verify_client_secret("secret", "not-a-phc-string").is_err());
    }
}
