//! Password hashing
//!
//! Digests are PHC strings (`$argon2id$v=19$m=..,t=..,p=..$salt$hash`), so
//! verification always runs with the cost recorded in the digest, not the
//! hasher's current parameters.

use argon2::{Algorithm, Argon2, Params, PasswordHasher as _, PasswordVerifier as _, Version};
use password_hash::{PasswordHash, SaltString};

use crate::constants::SALT_BYTES;
use crate::error::{entropy_err, hash_err, Result};

/// One-way password digests with constant-time verification.
pub trait PasswordHasher: Send + Sync {
    /// Produce a salted digest of `plaintext`
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// `Ok(false)` on mismatch; `Err` only when `digest` is unusable
    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool>;
}

/// Argon2id with a random 16-byte salt per digest
#[derive(Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    /// Library default cost (19 MiB, 2 passes, 1 lane)
    pub fn new() -> Self {
        Self { argon2: Argon2::default() }
    }

    /// Explicit cost: memory in KiB, iterations, lanes
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self> {
        let params = Params::new(m_cost, t_cost, p_cost, None).map_err(hash_err)?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Argon2Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2Hasher").finish_non_exhaustive()
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let mut salt_bytes = [0u8; SALT_BYTES];
        getrandom::getrandom(&mut salt_bytes).map_err(entropy_err)?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(hash_err)?;
        let phc = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(hash_err)?;
        Ok(phc.to_string())
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool> {
        let parsed = PasswordHash::new(digest).map_err(hash_err)?;
        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(hash_err(e)),
        }
    }
}

impl<T: PasswordHasher + ?Sized> PasswordHasher for std::sync::Arc<T> {
    fn hash(&self, plaintext: &str) -> Result<String> {
        (**self).hash(plaintext)
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool> {
        (**self).verify(plaintext, digest)
    }
}
