//! DEK lifecycle: generate once, wrap for storage, unwrap on unlock.
//!
//! ```text
//!   Uninitialized ──(no key anywhere: generate)──────────────► Ready
//!        │                                                      ▲ │
//!        └──(key found locally or remotely)──► AwaitingKey ─────┘ │ lock()
//!                                                  ▲   (unwrap ok)│
//!                                                  └──────────────┘
//!   any state ──(I/O error after retries)──► Failed (terminal)
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use zkv_core::{UserIdentity, VaultError, VaultResult, WrappedKeyRecord};
use zkv_crypto::{Dek, KdfParams, VerifierParams};
use zkv_storage::RemoteStore;

use crate::cache::LocalCache;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    /// No wrapped key has been seen yet.
    Uninitialized,
    /// A wrapped key exists; waiting for the right passphrase.
    AwaitingKey,
    /// DEK unwrapped and held in memory.
    Ready,
    /// A collaborator failed past the retry policy. Terminal.
    Failed,
}

/// How the vault became ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyKind {
    /// First-time setup generated a new DEK.
    Created,
    /// An existing wrapped DEK was unwrapped.
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Ready(ReadyKind),
    /// Does not reveal whether the verifier or the unwrap rejected it.
    WrongPassphraseOrCorruptKey,
}

impl UnlockOutcome {
    pub fn is_ready(self) -> bool {
        matches!(self, UnlockOutcome::Ready(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassphraseStatus {
    /// A verifier exists locally or remotely: the user has a vault.
    Set,
    NotSet,
}

/// Cost parameters for new keys plus the remote retry policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeSettings {
    pub kdf: KdfParams,
    pub verifier: VerifierParams,
    pub retry: RetryPolicy,
}

pub struct EnvelopeManager {
    user: UserIdentity,
    cache: LocalCache,
    remote: Arc<dyn RemoteStore>,
    settings: EnvelopeSettings,
    state: EnvelopeState,
    dek: Option<Arc<Dek>>,
}

impl EnvelopeManager {
    pub fn new(
        user: UserIdentity,
        cache: LocalCache,
        remote: Arc<dyn RemoteStore>,
        settings: EnvelopeSettings,
    ) -> Self {
        Self {
            user,
            cache,
            remote,
            settings,
            state: EnvelopeState::Uninitialized,
            dek: None,
        }
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// The in-memory DEK; only available in [`EnvelopeState::Ready`].
    pub fn dek(&self) -> VaultResult<Arc<Dek>> {
        match (self.state, &self.dek) {
            (EnvelopeState::Ready, Some(dek)) => Ok(dek.clone()),
            (EnvelopeState::Failed, _) => Err(VaultError::SessionFailed),
            _ => Err(VaultError::NotReady),
        }
    }

    /// Unlock with `passphrase`, creating the vault on first use.
    ///
    /// A wrong passphrase is an [`UnlockOutcome`], not an error. Errors are
    /// reserved for bad input and collaborator failures; the latter move the
    /// manager to [`EnvelopeState::Failed`].
    pub async fn unlock(&mut self, passphrase: &SecretString) -> VaultResult<UnlockOutcome> {
        if self.state == EnvelopeState::Failed {
            return Err(VaultError::SessionFailed);
        }
        if passphrase.expose_secret().is_empty() {
            return Err(VaultError::InvalidInput("passphrase is empty".into()));
        }

        let result = self.unlock_inner(passphrase).await;
        if let Err(e) = &result {
            if e.is_transient() {
                tracing::error!(user = %self.user, error = %e, "envelope failed");
                self.dek = None;
                self.state = EnvelopeState::Failed;
            }
        }
        result
    }

    async fn unlock_inner(&mut self, passphrase: &SecretString) -> VaultResult<UnlockOutcome> {
        match self.load_record().await {
            Ok(Some(record)) => {
                self.await_key();
                self.unlock_existing(passphrase, record).await
            }
            Ok(None) => self.create(passphrase).await,
            Err(VaultError::WrongPassphraseOrCorruptKey) => {
                tracing::warn!(user = %self.user, "stored key record is corrupt");
                self.await_key();
                Ok(UnlockOutcome::WrongPassphraseOrCorruptKey)
            }
            Err(e) => Err(e),
        }
    }

    /// Back to waiting for a passphrase, with no key held.
    fn await_key(&mut self) {
        self.dek = None;
        self.state = EnvelopeState::AwaitingKey;
    }

    /// Local cache first; on a miss, the remote copy populates the cache.
    async fn load_record(&self) -> VaultResult<Option<WrappedKeyRecord>> {
        if let Some(record) = self.cache.wrapped_key(&self.user).await? {
            tracing::debug!(user = %self.user, "wrapped key found in local cache");
            return Ok(Some(record));
        }

        let remote = self.remote.clone();
        let user = self.user.clone();
        let fetched = self
            .settings
            .retry
            .run("get_wrapped_key", || remote.get_wrapped_key(&user))
            .await?;

        if let Some(record) = &fetched {
            tracing::info!(user = %self.user, "wrapped key fetched from remote, caching locally");
            self.cache.put_wrapped_key(record).await?;
            if !record.verifier_hash.is_empty() {
                self.cache
                    .put_verifier(&self.user, &record.verifier_hash)
                    .await?;
            }
        }
        Ok(fetched)
    }

    async fn unlock_existing(
        &mut self,
        passphrase: &SecretString,
        record: WrappedKeyRecord,
    ) -> VaultResult<UnlockOutcome> {
        let stored_verifier = if record.verifier_hash.is_empty() {
            self.cache.verifier(&self.user).await?
        } else {
            Some(record.verifier_hash.clone())
        };

        if record.kdf_iterations == 0 {
            tracing::warn!(user = %self.user, "key record has no KDF rounds");
            return Ok(UnlockOutcome::WrongPassphraseOrCorruptKey);
        }

        let user = self.user.clone();
        let secret = own_secret(passphrase);
        let kdf = KdfParams {
            iterations: record.kdf_iterations,
        };

        // PBKDF2 and Argon2id are CPU-bound; keep them off the async workers.
        let unwrapped = tokio::task::spawn_blocking(move || {
            if let Some(stored) = &stored_verifier {
                zkv_crypto::verifier::verify(&secret, &user, stored)?;
            }
            let kek = zkv_crypto::derive_kek(&secret, &user, &kdf)?;
            zkv_crypto::unwrap_dek(&kek, &record.wrapped_dek, &record.wrap_nonce, &user)
        })
        .await
        .map_err(|e| VaultError::Crypto(format!("unlock task failed: {e}")))?;

        match unwrapped {
            Ok(dek) => {
                self.dek = Some(Arc::new(dek));
                self.state = EnvelopeState::Ready;
                tracing::info!(user = %self.user, "vault unlocked");
                Ok(UnlockOutcome::Ready(ReadyKind::Unlocked))
            }
            Err(VaultError::WrongPassphraseOrCorruptKey) => {
                tracing::warn!(user = %self.user, "unlock rejected");
                Ok(UnlockOutcome::WrongPassphraseOrCorruptKey)
            }
            Err(e) => Err(e),
        }
    }

    /// First-time setup. The remote copy is written before the local one so a
    /// device never caches a key that other devices cannot fetch.
    async fn create(&mut self, passphrase: &SecretString) -> VaultResult<UnlockOutcome> {
        let user = self.user.clone();
        let secret = own_secret(passphrase);
        let settings = self.settings;

        let (dek, record) = tokio::task::spawn_blocking(move || {
            let dek = zkv_crypto::generate_dek();
            let kek = zkv_crypto::derive_kek(&secret, &user, &settings.kdf)?;
            let wrapped = zkv_crypto::wrap_dek(&kek, &dek, &user)?;
            let verifier_hash =
                zkv_crypto::hash_for_verification(&secret, &user, &settings.verifier)?;
            let record = WrappedKeyRecord {
                user_id: user,
                wrapped_dek: wrapped.wrapped,
                wrap_nonce: wrapped.nonce.to_vec(),
                verifier_hash,
                kdf_iterations: settings.kdf.iterations,
            };
            Ok::<_, VaultError>((dek, record))
        })
        .await
        .map_err(|e| VaultError::Crypto(format!("key setup task failed: {e}")))??;

        let remote = self.remote.clone();
        self.settings
            .retry
            .run("upsert_wrapped_key", || remote.upsert_wrapped_key(record.clone()))
            .await?;
        self.cache.put_wrapped_key(&record).await?;
        self.cache
            .put_verifier(&self.user, &record.verifier_hash)
            .await?;

        self.dek = Some(Arc::new(dek));
        self.state = EnvelopeState::Ready;
        tracing::info!(user = %self.user, "new vault created");
        Ok(UnlockOutcome::Ready(ReadyKind::Created))
    }

    /// Whether this user already has a passphrase: local verifier, then the
    /// locally cached key record, then the remote store.
    pub async fn passphrase_status(&self) -> VaultResult<PassphraseStatus> {
        if self.cache.verifier(&self.user).await?.is_some() {
            return Ok(PassphraseStatus::Set);
        }
        if let Some(record) = self.cache.wrapped_key(&self.user).await? {
            if !record.verifier_hash.is_empty() {
                return Ok(PassphraseStatus::Set);
            }
        }
        let remote = self.remote.clone();
        let user = self.user.clone();
        let hash = self
            .settings
            .retry
            .run("get_verifier_hash", || remote.get_verifier_hash(&user))
            .await;
        match hash {
            Ok(Some(_)) => Ok(PassphraseStatus::Set),
            Ok(None) => Ok(PassphraseStatus::NotSet),
            // A record exists even if it no longer parses
            Err(VaultError::WrongPassphraseOrCorruptKey) => Ok(PassphraseStatus::Set),
            Err(e) => Err(e),
        }
    }

    /// Drop the DEK. The wrapped key stays, so the next unlock takes the
    /// returning-user path.
    pub fn lock(&mut self) {
        if self.state == EnvelopeState::Ready {
            self.await_key();
        } else {
            self.dek = None;
        }
    }

    /// Drop the DEK and forget that a key was ever seen (logout).
    pub fn wipe(&mut self) {
        self.dek = None;
        if self.state != EnvelopeState::Failed {
            self.state = EnvelopeState::Uninitialized;
        }
    }
}

/// An owned copy for moving into a blocking task.
fn own_secret(passphrase: &SecretString) -> SecretString {
    SecretString::from(passphrase.expose_secret().to_owned())
}
