use password_hash::{PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher as _, PasswordVerifier as _, Version};
use thiserror::Error;

use sessiongate_auth::PasswordVerifier;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordHashError {
    #[error("random source unavailable: {0}")]
    Random(String),

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Argon2id password hashing and verification (PHC string format).
pub struct Argon2PasswordVerifier {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl Argon2PasswordVerifier {
    /// Argon2id with the crate's default cost parameters.
    pub fn new() -> Result<Self, PasswordHashError> {
        Self::from_argon2(Argon2::default())
    }

    /// Custom cost parameters (tests use cheap ones).
    pub fn with_params(params: Params) -> Result<Self, PasswordHashError> {
        Self::from_argon2(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    fn from_argon2(argon2: Argon2<'static>) -> Result<Self, PasswordHashError> {
        // A hash of random bytes nobody knows, with the same parameters as real
        // hashes so verifying against it costs the same.
        let mut unknowable = [0u8; 32];
        getrandom::getrandom(&mut unknowable).map_err(|e| PasswordHashError::Random(e.to_string()))?;
        let dummy_hash = hash_with(&argon2, &unknowable)?;

        Ok(Self { argon2, dummy_hash })
    }

    pub fn hash_password(&self, plain: &str) -> Result<String, PasswordHashError> {
        hash_with(&self.argon2, plain.as_bytes())
    }
}

fn hash_with(argon2: &Argon2<'_>, password: &[u8]) -> Result<String, PasswordHashError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| PasswordHashError::Random(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| PasswordHashError::Hash(e.to_string()))?;
    let phc = argon2
        .hash_password(password, &salt)
        .map_err(|e| PasswordHashError::Hash(e.to_string()))?;
    Ok(phc.to_string())
}

impl PasswordVerifier for Argon2PasswordVerifier {
    fn verify_password(&self, plain: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self.argon2.verify_password(plain.as_bytes(), &parsed).is_ok(),
            Err(_) => {
                tracing::warn!("stored password hash is not a valid PHC string");
                false
            }
        }
    }

    fn dummy_hash(&self) -> &str {
        &self.dummy_hash
    }
}

impl core::fmt::Debug for Argon2PasswordVerifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Argon2PasswordVerifier")
            .field("params", self.argon2.params())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn cheap_verifier() -> Argon2PasswordVerifier {
    let params = Params::new(Params::MIN_M_COST, 1, 1, None).unwrap();
    Argon2PasswordVerifier::with_params(params).unwrap()
}
