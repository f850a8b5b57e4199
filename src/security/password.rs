// src/security/password.rs - Password hashing and challenge token generation

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use log::error;
use rand::RngCore;
use thiserror::Error;

/// Password service error
#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingError(String),

    #[error("Failed to verify password: {0}")]
    VerificationError(String),
}

/// Password service for hashing and verifying credentials
pub struct PasswordService;

impl PasswordService {
    /// Hash a password with a fresh random salt (Argon2id, encoded form)
    pub fn hash_password(password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                error!("Password hashing error: {}", e);
                PasswordError::HashingError(e.to_string())
            })
    }

    /// Verify a password against a stored hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| {
            error!("Password hash parsing error: {}", e);
            PasswordError::VerificationError(e.to_string())
        })?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

/// Generate an opaque hex token for out-of-band verification requests
pub fn generate_token(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let password = "test_password";

        let hash = PasswordService::hash_password(password).unwrap();

        let result = PasswordService::verify_password(password, &hash).unwrap();

        assert!(result);
    }

    #[test]
    fn test_verify_wrong_password() {
        let password = "test_password";
        let wrong_password = "wrong_password";

        let hash = PasswordService::hash_password(password).unwrap();

        let result = PasswordService::verify_password(wrong_password, &hash).unwrap();

        assert!(!result);
    }

    #[test]
    fn test_generate_token_length_and_charset() {
        let token = generate_token(32);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        // Two draws should essentially never collide
        assert_ne!(token, generate_token(32));
    }
}
