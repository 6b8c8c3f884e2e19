//! Credential field encryption under the DEK.
//!
//! Every field gets its own fresh nonce; nonces are never shared between the
//! username, password, and website of one record. The AAD binds each
//! ciphertext to its role and owner so fields cannot be swapped around.

use secrecy::{ExposeSecret, SecretString};
use zkv_core::types::now_millis;
use zkv_core::{
    CredentialFields, CredentialRecord, DecryptedCredential, EncryptedField, UserIdentity,
    VaultError, VaultResult,
};

use crate::aead;
use crate::keys::Dek;

/// Which credential field a ciphertext belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Username,
    Password,
    Website,
}

impl FieldRole {
    pub fn label(self) -> &'static str {
        match self {
            FieldRole::Username => "username",
            FieldRole::Password => "password",
            FieldRole::Website => "website",
        }
    }

    /// AAD: `"zkv-field:" || role || ":" || user id`
    pub fn aad(self, user: &UserIdentity) -> Vec<u8> {
        let mut aad = Vec::with_capacity(32 + user.as_bytes().len());
        aad.extend_from_slice(b"zkv-field:");
        aad.extend_from_slice(self.label().as_bytes());
        aad.push(b':');
        aad.extend_from_slice(user.as_bytes());
        aad
    }
}

/// Encrypt one field with a freshly generated nonce.
pub fn encrypt_field(plaintext: &str, dek: &Dek, aad: &[u8]) -> VaultResult<EncryptedField> {
    let sealed = aead::seal(dek.as_bytes(), plaintext.as_bytes(), aad)?;
    Ok(EncryptedField {
        ciphertext: sealed.ciphertext,
        nonce: sealed.nonce.to_vec(),
    })
}

/// Decrypt one field. Tag mismatch is [`VaultError::AuthenticationFailure`].
pub fn decrypt_field(field: &EncryptedField, dek: &Dek, aad: &[u8]) -> VaultResult<String> {
    let plaintext = aead::open(dek.as_bytes(), &field.nonce, &field.ciphertext, aad)?;
    String::from_utf8(plaintext.to_vec())
        .map_err(|_| VaultError::Crypto("decrypted field is not UTF-8".into()))
}

/// Encrypt a new credential into a storable record under `id`.
pub fn encrypt_credential(
    user: &UserIdentity,
    fields: &CredentialFields,
    dek: &Dek,
    id: String,
) -> VaultResult<CredentialRecord> {
    fields.validate()?;

    let website = match fields.website.as_deref() {
        Some(w) if !w.is_empty() => Some(encrypt_field(w, dek, &FieldRole::Website.aad(user))?),
        _ => None,
    };
    let username = encrypt_field(&fields.username, dek, &FieldRole::Username.aad(user))?;
    let password = encrypt_field(
        fields.password.expose_secret(),
        dek,
        &FieldRole::Password.aad(user),
    )?;

    let now = now_millis();
    Ok(CredentialRecord {
        id,
        user_id: user.clone(),
        space: fields.space_or_default().to_string(),
        website,
        username,
        password,
        created_at: now,
        updated_at: now,
    })
}

/// Decrypt every field of a record. Fails as a whole if any field fails.
pub fn decrypt_credential(record: &CredentialRecord, dek: &Dek) -> VaultResult<DecryptedCredential> {
    let user = &record.user_id;
    let website = record
        .website
        .as_ref()
        .map(|w| decrypt_field(w, dek, &FieldRole::Website.aad(user)))
        .transpose()?;
    let username = decrypt_field(&record.username, dek, &FieldRole::Username.aad(user))?;
    let password = decrypt_field(&record.password, dek, &FieldRole::Password.aad(user))?;

    Ok(DecryptedCredential {
        id: record.id.clone(),
        space: record.space.clone(),
        website,
        username,
        password: SecretString::from(password),
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}
