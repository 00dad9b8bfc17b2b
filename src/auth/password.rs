use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::KdfConfig;

/// Argon2id credential hasher. The produced PHC string embeds algorithm,
/// parameters and salt, so verification needs nothing beyond the stored
/// value itself.
#[derive(Clone)]
pub struct CredentialHasher {
    params: Params,
    /// Hash of a throwaway password, computed once from the configured
    /// parameters. Login verifies against it when the account is unknown or
    /// has no local credential, so both outcomes cost the same KDF pass as a
    /// real mismatch.
    dummy_hash: String,
}

impl CredentialHasher {
    pub fn new(cfg: &KdfConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 parameters: {e}"))?;
        let mut hasher = Self {
            params,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash(&Uuid::new_v4().to_string())?;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a plaintext password with a fresh random salt. Failure here means
    /// the entropy source or KDF itself is broken and is treated as fatal by
    /// callers, never as a credential problem.
    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Verify a candidate against a stored hash. Malformed stored values and
    /// accounts without a local credential (federated accounts) verify as
    /// false rather than erroring; the comparison inside argon2 is
    /// constant-time.
    pub fn verify(&self, plain: &str, stored: Option<&str>) -> bool {
        let stored = stored.unwrap_or(&self.dummy_hash);
        let parsed = match PasswordHash::new(stored) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "stored credential hash is malformed");
                return false;
            }
        };
        self.argon2().verify_password(plain.as_bytes(), &parsed).is_ok()
    }
}
