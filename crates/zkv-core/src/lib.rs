pub mod config;
pub mod error;
pub mod types;

pub use error::{VaultError, VaultResult};
pub use types::{
    CredentialFields, CredentialRecord, DecryptedCredential, EncryptedField, UserIdentity,
    WrappedKeyRecord, DEFAULT_SPACE,
};
