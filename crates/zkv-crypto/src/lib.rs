//! zkv-crypto: client-side key management and field encryption
//!
//! Key hierarchy:
//! ```text
//! Passphrase + user id
//!   ├── KEK (256-bit, PBKDF2-HMAC-SHA256, salt = user id)   never stored
//!   │   └── wraps DEK: AES-256-GCM (nonce = random 96-bit, AAD = "zkv-dek-wrap:" || user id)
//!   └── Verifier (Argon2id PHC over passphrase || user id)   stored remotely, never decrypts
//!
//! DEK (256-bit random, generated once per user)
//!   └── Field AEAD: AES-256-GCM per field (nonce = random 96-bit, AAD = "zkv-field:" || role || ":" || user id)
//! ```

pub mod aead;
pub mod field;
pub mod kdf;
pub mod keys;
pub mod password;
pub mod verifier;

pub use field::{decrypt_credential, decrypt_field, encrypt_credential, encrypt_field, FieldRole};
pub use kdf::{derive_kek, KdfParams, Kek};
pub use keys::{generate_dek, unwrap_dek, wrap_dek, Dek, WrappedDek};
pub use password::generate_strong_password;
pub use verifier::{hash_for_verification, matches, VerifierParams};

/// Size of every symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
