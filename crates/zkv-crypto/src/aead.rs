//! AES-256-GCM seal/open shared by key wrapping and field encryption.
//!
//! Sealed output keeps the nonce separate from `ciphertext || tag` so both can
//! be stored as distinct, recoverable components.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::Zeroizing;
use zkv_core::{VaultError, VaultResult};

use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Output of [`seal`]: a fresh nonce and `ciphertext || 16-byte tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Draw a random 96-bit nonce from the thread-local CSPRNG.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` under `key` with a newly generated nonce.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8], aad: &[u8]) -> VaultResult<Sealed> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce = generate_nonce();

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| VaultError::Crypto(format!("AES-256-GCM encryption failed: {e}")))?;

    Ok(Sealed { nonce, ciphertext })
}

/// Decrypt and authenticate `ciphertext || tag`.
///
/// Any tag mismatch (tampering, wrong key, wrong AAD) is
/// [`VaultError::AuthenticationFailure`]; no partial plaintext is returned.
pub fn open(
    key: &[u8; KEY_SIZE],
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> VaultResult<Zeroizing<Vec<u8>>> {
    if nonce.len() != NONCE_SIZE {
        return Err(VaultError::InvalidInput(format!(
            "nonce is {} bytes (expected {NONCE_SIZE})",
            nonce.len()
        )));
    }
    if ciphertext.len() < TAG_SIZE {
        return Err(VaultError::AuthenticationFailure);
    }

    let cipher = Aes256Gcm::new(key.into());
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| VaultError::AuthenticationFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_SIZE] = [7u8; KEY_SIZE];

    #[test]
    fn test_seal_open_roundtrip() {
        let sealed = seal(&KEY, b"hello, sealed world", b"aad").unwrap();
        let opened = open(&KEY, &sealed.nonce, &sealed.ciphertext, b"aad").unwrap();
        assert_eq!(opened.as_slice(), b"hello, sealed world");
    }

    #[test]
    fn test_sealed_size() {
        let sealed = seal(&KEY, &[0u8; 100], b"").unwrap();
        // plaintext (100) + tag (16)
        assert_eq!(sealed.ciphertext.len(), 100 + TAG_SIZE);
    }

    #[test]
    fn test_open_wrong_aad() {
        let sealed = seal(&KEY, b"secret", b"a").unwrap();
        let result = open(&KEY, &sealed.nonce, &sealed.ciphertext, b"b");
        assert!(matches!(result, Err(VaultError::AuthenticationFailure)));
    }

    #[test]
    fn test_open_wrong_key() {
        let sealed = seal(&KEY, b"secret", b"").unwrap();
        let result = open(&[8u8; KEY_SIZE], &sealed.nonce, &sealed.ciphertext, b"");
        assert!(matches!(result, Err(VaultError::AuthenticationFailure)));
    }

    #[test]
    fn test_open_truncated() {
        let result = open(&KEY, &[0u8; NONCE_SIZE], &[0u8; 5], b"");
        assert!(matches!(result, Err(VaultError::AuthenticationFailure)));
    }

    #[test]
    fn test_open_bad_nonce_length() {
        let sealed = seal(&KEY, b"secret", b"").unwrap();
        let result = open(&KEY, &sealed.nonce[..8], &sealed.ciphertext, b"");
        assert!(matches!(result, Err(VaultError::InvalidInput(_))));
    }

    #[test]
    fn test_nonces_differ_per_call() {
        let a = seal(&KEY, b"same", b"").unwrap();
        let b = seal(&KEY, b"same", b"").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }
}
