//! Data-encryption key: generation and envelope wrapping under the KEK

use rand::RngCore;
use zeroize::Zeroize;
use zkv_core::{UserIdentity, VaultError, VaultResult};

use crate::aead;
use crate::kdf::Kek;
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// The per-user 256-bit data-encryption key. Zeroized on drop.
#[derive(Clone)]
pub struct Dek {
    bytes: [u8; KEY_SIZE],
}

impl Dek {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for Dek {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Dek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dek").field("bytes", &"[REDACTED]").finish()
    }
}

/// A DEK encrypted under a KEK: the only form of the DEK that is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedDek {
    /// `ciphertext || tag`
    pub wrapped: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
}

/// Generate a random 256-bit data-encryption key.
pub fn generate_dek() -> Dek {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    let dek = Dek::from_bytes(bytes);
    bytes.zeroize();
    dek
}

/// AAD for the wrap: binds the wrapped DEK to its owner.
fn wrap_aad(user: &UserIdentity) -> Vec<u8> {
    let mut aad = Vec::with_capacity(13 + user.as_bytes().len());
    aad.extend_from_slice(b"zkv-dek-wrap:");
    aad.extend_from_slice(user.as_bytes());
    aad
}

/// Wrap (encrypt) the DEK's raw bytes under the KEK with a fresh nonce.
pub fn wrap_dek(kek: &Kek, dek: &Dek, user: &UserIdentity) -> VaultResult<WrappedDek> {
    let sealed = aead::seal(kek.as_bytes(), dek.as_bytes(), &wrap_aad(user))?;
    Ok(WrappedDek {
        wrapped: sealed.ciphertext,
        nonce: sealed.nonce,
    })
}

/// Unwrap (decrypt) a DEK.
///
/// A tag mismatch means the passphrase was wrong or the record is corrupt;
/// both surface as [`VaultError::WrongPassphraseOrCorruptKey`].
pub fn unwrap_dek(
    kek: &Kek,
    wrapped: &[u8],
    nonce: &[u8],
    user: &UserIdentity,
) -> VaultResult<Dek> {
    if wrapped.len() != KEY_SIZE + TAG_SIZE || nonce.len() != NONCE_SIZE {
        return Err(VaultError::WrongPassphraseOrCorruptKey);
    }

    let plaintext = aead::open(kek.as_bytes(), nonce, wrapped, &wrap_aad(user))
        .map_err(|_| VaultError::WrongPassphraseOrCorruptKey)?;

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);

    let dek = Dek::from_bytes(key_bytes);
    key_bytes.zeroize();
    Ok(dek)
}
