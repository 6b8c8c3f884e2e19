//! Key derivation: PBKDF2-HMAC-SHA256 (passphrase, user id) → KEK

use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;
use zkv_core::config::RECOMMENDED_KDF_ITERATIONS;
use zkv_core::{UserIdentity, VaultError, VaultResult};

use crate::KEY_SIZE;

/// A 256-bit key-encryption-key. Only ever wraps or unwraps the DEK.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct Kek {
    bytes: [u8; KEY_SIZE],
}

impl Kek {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for Kek {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Kek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kek").field("bytes", &"[REDACTED]").finish()
    }
}

/// PBKDF2 parameters for KEK derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// HMAC-SHA256 rounds (default: 200000)
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: RECOMMENDED_KDF_ITERATIONS,
        }
    }
}

/// Derive the KEK for `user` from `passphrase`.
///
/// The salt is the UTF-8 bytes of the user id, so every device re-derives the
/// same key without storing anything. Deterministic for fixed inputs.
pub fn derive_kek(
    passphrase: &SecretString,
    user: &UserIdentity,
    params: &KdfParams,
) -> VaultResult<Kek> {
    let secret = passphrase.expose_secret();
    if secret.is_empty() {
        return Err(VaultError::InvalidInput("passphrase is empty".into()));
    }
    if params.iterations == 0 {
        return Err(VaultError::InvalidInput("KDF iteration count is zero".into()));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), user.as_bytes(), params.iterations, &mut key);

    let kek = Kek::from_bytes(key);
    key.zeroize();
    Ok(kek)
}
