//! Password hashing behind a small trait so the policy can be swapped.

use anyhow::{Result, anyhow};
use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString};

use crate::types::HashedPassword;

pub trait PasswordVerifier: Send + Sync {
    /// Hash a plaintext secret for storage.
    fn hash(&self, plaintext: &str) -> Result<HashedPassword>;

    /// Compare a plaintext secret against a stored hash.
    fn matches(&self, plaintext: &str, hash: &HashedPassword) -> bool;
}

/// Argon2id with default parameters and a random 16-byte salt.
#[derive(Debug, Default, Clone)]
pub struct Argon2PasswordVerifier;

impl Argon2PasswordVerifier {
    pub fn new() -> Self {
        Self
    }
}

impl PasswordVerifier for Argon2PasswordVerifier {
    fn hash(&self, plaintext: &str) -> Result<HashedPassword> {
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
        let phc = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| anyhow!(e.to_string()))?
            .to_string();
        Ok(HashedPassword::new(phc))
    }

    fn matches(&self, plaintext: &str, hash: &HashedPassword) -> bool {
        match PasswordHash::new(hash.as_str()) {
            Ok(parsed) => Argon2::default()
                .verify_password(plaintext.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_match() {
        let verifier = Argon2PasswordVerifier::new();
        let hash = verifier.hash("Correct-Horse-42").unwrap();

        assert!(hash.as_str().starts_with("$argon2id$"));
        assert!(verifier.matches("Correct-Horse-42", &hash));
        assert!(!verifier.matches("correct-horse-42", &hash));
        assert!(!verifier.matches("", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let verifier = Argon2PasswordVerifier::new();
        let a = verifier.hash("Same-Password!").unwrap();
        let b = verifier.hash("Same-Password!").unwrap();
        assert_ne!(a, b);
        assert!(verifier.matches("Same-Password!", &a));
        assert!(verifier.matches("Same-Password!", &b));
    }

    #[test]
    fn test_unparsable_hash_never_matches() {
        let verifier = Argon2PasswordVerifier::new();
        assert!(!verifier.matches("anything", &HashedPassword::new("not-a-phc-string")));
        assert!(!verifier.matches("", &HashedPassword::new("")));
    }
}
