use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    /// Empty passphrase, empty user identifier, or other malformed caller input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Key unwrap or verifier check failed. Deliberately does not say which,
    /// nor whether the user exists at all.
    #[error("wrong passphrase or corrupt key record")]
    WrongPassphraseOrCorruptKey,

    /// Field-level AEAD tag mismatch: tampered ciphertext or wrong key.
    #[error("authentication failure: ciphertext tampered or wrong key")]
    AuthenticationFailure,

    /// Collaborator timeout or network failure. Retryable.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// Local cache and remote store disagree after a reconciliation pass.
    #[error(
        "persistence invariant violated: {} id(s) only local, {} id(s) only remote",
        local_only.len(),
        remote_only.len()
    )]
    PersistenceInvariantViolation {
        local_only: Vec<String>,
        remote_only: Vec<String>,
    },

    #[error("vault is not unlocked")]
    NotReady,

    #[error("session failed after unrecoverable I/O error; start a new session")]
    SessionFailed,

    #[error("credential not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VaultError {
    /// Whether a caller may reasonably retry the operation as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, VaultError::TransientIo(_) | VaultError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(VaultError::TransientIo("timeout".into()).is_transient());
        assert!(VaultError::Io(std::io::Error::other("disk")).is_transient());
        assert!(!VaultError::WrongPassphraseOrCorruptKey.is_transient());
        assert!(!VaultError::AuthenticationFailure.is_transient());
        assert!(!VaultError::InvalidInput("empty".into()).is_transient());
    }

    #[test]
    fn test_wrong_passphrase_message_does_not_leak() {
        let msg = VaultError::WrongPassphraseOrCorruptKey.to_string();
        assert!(!msg.contains("not found"));
        assert!(!msg.contains("user"));
    }

    #[test]
    fn test_invariant_violation_message_counts() {
        let err = VaultError::PersistenceInvariantViolation {
            local_only: vec!["a".into()],
            remote_only: vec!["b".into(), "c".into()],
        };
        assert_eq!(
            err.to_string(),
            "persistence invariant violated: 1 id(s) only local, 2 id(s) only remote"
        );
    }
}
