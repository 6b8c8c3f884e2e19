//! Passphrase verifier: Argon2id PHC hash over `passphrase || user id`
//!
//! Independent of the KEK derivation, so a leaked verifier (it lives on the
//! server) yields nothing that decrypts the DEK. Verification goes through
//! `argon2`'s own constant-time comparison.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;
use zkv_core::{UserIdentity, VaultError, VaultResult};

/// Argon2id cost parameters for new verifier hashes.
///
/// Verification reads the parameters embedded in the stored PHC string, so
/// changing these never invalidates existing verifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifierParams {
    /// Memory cost in KiB (default: 19456 = 19 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 2)
    pub time_cost: u32,
    /// Parallelism (default: 1)
    pub parallelism: u32,
}

impl Default for VerifierParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 19456,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

fn verifier_input(passphrase: &SecretString, user: &UserIdentity) -> Zeroizing<Vec<u8>> {
    let secret = passphrase.expose_secret().as_bytes();
    let mut input = Zeroizing::new(Vec::with_capacity(secret.len() + user.as_bytes().len()));
    input.extend_from_slice(secret);
    input.extend_from_slice(user.as_bytes());
    input
}

/// Produce a PHC-format verifier hash with a random salt.
pub fn hash_for_verification(
    passphrase: &SecretString,
    user: &UserIdentity,
    params: &VerifierParams,
) -> VaultResult<String> {
    if passphrase.expose_secret().is_empty() {
        return Err(VaultError::InvalidInput("passphrase is empty".into()));
    }

    let argon2_params = Params::new(params.mem_cost_kib, params.time_cost, params.parallelism, None)
        .map_err(|e| VaultError::Crypto(format!("invalid Argon2id params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(&verifier_input(passphrase, user), &salt)
        .map_err(|e| VaultError::Crypto(format!("verifier hashing failed: {e}")))?;

    Ok(hash.to_string())
}

/// Whether `passphrase` matches `stored`. A malformed stored hash is a mismatch.
pub fn matches(passphrase: &SecretString, user: &UserIdentity, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        tracing::debug!("stored verifier hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(&verifier_input(passphrase, user), &parsed)
        .is_ok()
}

/// [`matches`] as a result: a mismatch is [`VaultError::WrongPassphraseOrCorruptKey`].
pub fn verify(passphrase: &SecretString, user: &UserIdentity, stored: &str) -> VaultResult<()> {
    if matches(passphrase, user, stored) {
        Ok(())
    } else {
        Err(VaultError::WrongPassphraseOrCorruptKey)
    }
}
