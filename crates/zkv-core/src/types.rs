use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Space assigned to credentials saved without one.
pub const DEFAULT_SPACE: &str = "main";

/// Opaque user identifier issued by the account provider.
///
/// Used as the KDF salt and as the partition key for every remote record.
/// Never empty: construction and deserialization both reject "".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserIdentity(String);

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> VaultResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(VaultError::InvalidInput("user identifier is empty".into()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for UserIdentity {
    type Error = VaultError;

    fn try_from(value: String) -> VaultResult<Self> {
        Self::new(value)
    }
}

impl From<UserIdentity> for String {
    fn from(id: UserIdentity) -> Self {
        id.0
    }
}

impl std::fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One AEAD-encrypted field: ciphertext (with the 16-byte tag appended) and
/// the 12-byte nonce used for this field alone.
///
/// Both halves travel as standard base64 strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedField {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
}

/// The DEK wrapped under the passphrase-derived KEK, as stored both on-device
/// and remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKeyRecord {
    pub user_id: UserIdentity,
    /// DEK ciphertext + tag
    #[serde(with = "b64")]
    pub wrapped_dek: Vec<u8>,
    /// Nonce of this specific wrap operation
    #[serde(with = "b64")]
    pub wrap_nonce: Vec<u8>,
    /// Argon2id PHC string; never used to decrypt anything
    pub verifier_hash: String,
    /// PBKDF2 rounds used to derive the KEK that wrapped this DEK
    pub kdf_iterations: u32,
}

/// A stored credential. Everything but `space` and the bookkeeping fields is
/// ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: String,
    pub user_id: UserIdentity,
    pub space: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<EncryptedField>,
    pub username: EncryptedField,
    pub password: EncryptedField,
    /// Unix milliseconds
    pub created_at: u64,
    /// Unix milliseconds
    pub updated_at: u64,
}

/// Plaintext input for a new credential.
#[derive(Debug)]
pub struct CredentialFields {
    pub space: Option<String>,
    pub website: Option<String>,
    pub username: String,
    pub password: SecretString,
}

impl CredentialFields {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            space: None,
            website: None,
            username: username.into(),
            password,
        }
    }

    pub fn with_space(mut self, space: impl Into<String>) -> Self {
        self.space = Some(space.into());
        self
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    /// Username and password are required; an empty website counts as none.
    pub fn validate(&self) -> VaultResult<()> {
        if self.username.is_empty() {
            return Err(VaultError::InvalidInput("username is required".into()));
        }
        if self.password.expose_secret().is_empty() {
            return Err(VaultError::InvalidInput("password is required".into()));
        }
        if matches!(&self.space, Some(s) if s.trim().is_empty()) {
            return Err(VaultError::InvalidInput("space label is empty".into()));
        }
        Ok(())
    }

    pub fn space_or_default(&self) -> &str {
        self.space.as_deref().unwrap_or(DEFAULT_SPACE)
    }
}

/// Decrypted view of a [`CredentialRecord`] held in the session working set.
pub struct DecryptedCredential {
    pub id: String,
    pub space: String,
    pub website: Option<String>,
    pub username: String,
    pub password: SecretString,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Clone for DecryptedCredential {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            space: self.space.clone(),
            website: self.website.clone(),
            username: self.username.clone(),
            password: SecretString::from(self.password.expose_secret().to_owned()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl std::fmt::Debug for DecryptedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedCredential")
            .field("id", &self.id)
            .field("space", &self.space)
            .field("website", &self.website)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// serde adapter: `Vec<u8>` as a standard base64 string
pub mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
