//! Property-based tests for field encryption, envelope wrapping, and the KDF.

use proptest::prelude::*;
use secrecy::SecretString;
use std::collections::HashSet;
use zkv_core::{UserIdentity, VaultError};
use zkv_crypto::{
    decrypt_field, derive_kek, encrypt_field, unwrap_dek, wrap_dek, Dek, FieldRole, KdfParams,
    Kek, KEY_SIZE,
};

const FAST_KDF: KdfParams = KdfParams { iterations: 100 };

fn user() -> UserIdentity {
    UserIdentity::new("user-42").unwrap()
}

proptest! {
    /// decrypt(encrypt(p, k)) == p for printable Unicode plaintexts and any key.
    #[test]
    fn field_roundtrip_printable_unicode(
        plaintext in "\\PC{0,200}",
        key in any::<[u8; KEY_SIZE]>(),
    ) {
        let dek = Dek::from_bytes(key);
        let aad = FieldRole::Username.aad(&user());
        let enc = encrypt_field(&plaintext, &dek, &aad).unwrap();
        prop_assert_eq!(decrypt_field(&enc, &dek, &aad).unwrap(), plaintext);
    }

    /// Flipping any single bit of ciphertext or tag fails authentication.
    #[test]
    fn field_bit_flip_fails(
        plaintext in "\\PC{0,64}",
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let dek = Dek::from_bytes([0xCC; KEY_SIZE]);
        let aad = FieldRole::Password.aad(&user());
        let mut enc = encrypt_field(&plaintext, &dek, &aad).unwrap();

        let i = position.index(enc.ciphertext.len());
        enc.ciphertext[i] ^= 1 << bit;

        let result = decrypt_field(&enc, &dek, &aad);
        prop_assert!(matches!(result, Err(VaultError::AuthenticationFailure)));
    }

    /// unwrap(wrap(DEK, KEK), KEK) == DEK; a different KEK fails.
    #[test]
    fn envelope_roundtrip(
        dek_bytes in any::<[u8; KEY_SIZE]>(),
        kek_bytes in any::<[u8; KEY_SIZE]>(),
        other_bytes in any::<[u8; KEY_SIZE]>(),
    ) {
        prop_assume!(kek_bytes != other_bytes);
        let dek = Dek::from_bytes(dek_bytes);
        let kek = Kek::from_bytes(kek_bytes);

        let wrapped = wrap_dek(&kek, &dek, &user()).unwrap();
        let unwrapped = unwrap_dek(&kek, &wrapped.wrapped, &wrapped.nonce, &user()).unwrap();
        prop_assert_eq!(unwrapped.as_bytes(), dek.as_bytes());

        let other = Kek::from_bytes(other_bytes);
        let result = unwrap_dek(&other, &wrapped.wrapped, &wrapped.nonce, &user());
        prop_assert!(matches!(result, Err(VaultError::WrongPassphraseOrCorruptKey)));
    }

    /// derive() is deterministic for any passphrase / user pair.
    #[test]
    fn kdf_deterministic(passphrase in "\\PC{1,40}", id in "[a-z0-9-]{1,24}") {
        let user = UserIdentity::new(id).unwrap();
        let secret = SecretString::from(passphrase);
        let a = derive_kek(&secret, &user, &FAST_KDF).unwrap();
        let b = derive_kek(&secret, &user, &FAST_KDF).unwrap();
        prop_assert_eq!(a.as_bytes(), b.as_bytes());
    }
}

#[test]
fn kdf_distinct_passphrases_yield_distinct_keys() {
    let user = user();
    let mut keys = HashSet::new();
    // Neighbouring passphrases differing by a single character.
    for i in 0..500u32 {
        let passphrase = SecretString::from(format!("Tr0ub4dor&{i}"));
        let kek = derive_kek(&passphrase, &user, &FAST_KDF).unwrap();
        assert!(keys.insert(*kek.as_bytes()), "KEK collision at sample {i}");
    }
    assert_eq!(keys.len(), 500);
}
