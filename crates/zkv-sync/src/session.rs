//! `VaultSession`: the upward API one unlocked vault exposes to a UI.

use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use zkv_core::config::VaultConfig;
use zkv_core::{
    CredentialFields, DecryptedCredential, UserIdentity, VaultError, VaultResult, DEFAULT_SPACE,
};
use zkv_crypto::{Dek, KdfParams, VerifierParams};
use zkv_storage::{LocalStore, RemoteStore};

use crate::cache::LocalCache;
use crate::envelope::{EnvelopeManager, EnvelopeSettings, EnvelopeState, PassphraseStatus, UnlockOutcome};
use crate::reconcile::{AuditReport, Reconciler};
use crate::retry::RetryPolicy;
use crate::view::{ViewQuery, WorkingSet};

/// Tunables for one session, normally taken from [`VaultConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSettings {
    pub envelope: EnvelopeSettings,
}

impl SessionSettings {
    pub fn from_config(cfg: &VaultConfig) -> Self {
        Self {
            envelope: EnvelopeSettings {
                kdf: KdfParams {
                    iterations: cfg.crypto.kdf_iterations,
                },
                verifier: VerifierParams {
                    mem_cost_kib: cfg.crypto.verifier_mem_cost_kib,
                    time_cost: cfg.crypto.verifier_time_cost,
                    parallelism: cfg.crypto.verifier_parallelism,
                },
                retry: RetryPolicy::from_config(&cfg.sync),
            },
        }
    }
}

/// One user's vault. Methods take `&self`; share it behind an `Arc`.
pub struct VaultSession {
    user: UserIdentity,
    cache: LocalCache,
    remote: Arc<dyn RemoteStore>,
    retry: RetryPolicy,
    envelope: Mutex<EnvelopeManager>,
    reconciler: Reconciler,
    /// `None` until the first successful load after unlock.
    working: RwLock<Option<WorkingSet>>,
}

impl VaultSession {
    pub fn new(
        user: UserIdentity,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        settings: SessionSettings,
    ) -> Self {
        let cache = LocalCache::new(local);
        let retry = settings.envelope.retry;
        Self {
            envelope: Mutex::new(EnvelopeManager::new(
                user.clone(),
                cache.clone(),
                remote.clone(),
                settings.envelope,
            )),
            reconciler: Reconciler::new(user.clone(), cache.clone(), remote.clone(), retry),
            working: RwLock::new(None),
            user,
            cache,
            remote,
            retry,
        }
    }

    pub fn user(&self) -> &UserIdentity {
        &self.user
    }

    pub async fn state(&self) -> EnvelopeState {
        self.envelope.lock().await.state()
    }

    pub async fn passphrase_status(&self) -> VaultResult<PassphraseStatus> {
        self.envelope.lock().await.passphrase_status().await
    }

    /// Unlock (or create) the vault, then load the working set.
    ///
    /// When the bootstrap from the remote store leaves the cache disagreeing
    /// with it, the envelope is still ready but the divergence is returned.
    pub async fn unlock(&self, passphrase: &SecretString) -> VaultResult<UnlockOutcome> {
        let outcome = self.envelope.lock().await.unlock(passphrase).await;
        match outcome {
            Ok(outcome) if outcome.is_ready() => {
                self.reload().await?;
                Ok(outcome)
            }
            other => {
                // Rejected or failed: no decrypted data may outlive the key
                *self.working.write().await = None;
                other
            }
        }
    }

    async fn dek(&self) -> VaultResult<Arc<Dek>> {
        self.envelope.lock().await.dek()
    }

    /// Re-run reconciliation and replace the working set.
    pub async fn reload(&self) -> VaultResult<()> {
        let dek = self.dek().await?;
        let loaded = self.reconciler.load().await?;
        let set = WorkingSet::decrypt(&loaded.records, &dek).with_unreadable(loaded.unreadable);
        tracing::info!(
            origin = ?loaded.origin,
            readable = set.len(),
            unreadable = set.unreadable().len(),
            "working set loaded"
        );
        *self.working.write().await = Some(set);
        Ok(())
    }

    async fn ensure_loaded(&self) -> VaultResult<()> {
        if self.working.read().await.is_none() {
            self.reload().await?;
        }
        Ok(())
    }

    async fn read_working<T>(&self, f: impl FnOnce(&WorkingSet) -> T) -> VaultResult<T> {
        // The DEK check also rejects locked and failed sessions.
        self.dek().await?;
        self.ensure_loaded().await?;
        let guard = self.working.read().await;
        guard.as_ref().map(f).ok_or(VaultError::NotReady)
    }

    /// Encrypt and persist a new credential; it joins the working set only
    /// once both stores hold it.
    pub async fn create_credential(
        &self,
        fields: CredentialFields,
    ) -> VaultResult<DecryptedCredential> {
        fields.validate()?;
        let dek = self.dek().await?;
        self.ensure_loaded().await?;

        let id = uuid::Uuid::new_v4().to_string();
        let record = zkv_crypto::encrypt_credential(&self.user, &fields, &dek, id)?;
        let stored = self.reconciler.create(record).await?;
        let credential = zkv_crypto::decrypt_credential(&stored, &dek)?;

        if let Err(e) = self.remember_space(&credential.space).await {
            tracing::warn!(space = %credential.space, error = %e, "could not record space");
        }
        if let Some(set) = self.working.write().await.as_mut() {
            set.insert(credential.clone());
        }
        tracing::info!(id = %credential.id, space = %credential.space, "credential created");
        Ok(credential)
    }

    pub async fn delete_credential(&self, id: &str) -> VaultResult<()> {
        if !self.read_working(|set| set.contains(id)).await? {
            return Err(VaultError::NotFound(id.to_string()));
        }
        self.reconciler.delete(id).await?;
        if let Some(set) = self.working.write().await.as_mut() {
            set.remove(id);
        }
        tracing::info!(id, "credential deleted");
        Ok(())
    }

    /// Every readable credential, in creation order.
    pub async fn list_decrypted(&self) -> VaultResult<Vec<DecryptedCredential>> {
        self.read_working(|set| set.entries().to_vec()).await
    }

    pub async fn view(&self, query: &ViewQuery) -> VaultResult<Vec<DecryptedCredential>> {
        self.read_working(|set| set.view(query)).await
    }

    /// Ids of records that failed to parse or decrypt.
    pub async fn unreadable(&self) -> VaultResult<Vec<String>> {
        self.read_working(|set| set.unreadable().to_vec()).await
    }

    /// Space labels: the local list, else the distinct spaces of the remote
    /// records, always including `"main"`.
    pub async fn spaces(&self) -> VaultResult<Vec<String>> {
        if let Some(spaces) = self.cache.spaces(&self.user).await? {
            if !spaces.is_empty() {
                return Ok(spaces);
            }
        }

        let remote = self.remote.clone();
        let user = self.user.clone();
        let mut spaces = self
            .retry
            .run("list_spaces", || remote.list_spaces(&user))
            .await?;
        if !spaces.iter().any(|s| s == DEFAULT_SPACE) {
            spaces.insert(0, DEFAULT_SPACE.to_string());
        }
        self.cache.put_spaces(&self.user, &spaces).await?;
        Ok(spaces)
    }

    /// Add a space label; adding an existing one is a no-op.
    pub async fn add_space(&self, name: &str) -> VaultResult<Vec<String>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::InvalidInput("space name is empty".into()));
        }
        self.remember_space(name).await
    }

    async fn remember_space(&self, name: &str) -> VaultResult<Vec<String>> {
        let mut spaces = self.spaces().await?;
        if !spaces.iter().any(|s| s == name) {
            spaces.push(name.to_string());
            self.cache.put_spaces(&self.user, &spaces).await?;
        }
        Ok(spaces)
    }

    /// Check the local cache against a fresh remote listing.
    pub async fn audit(&self) -> VaultResult<AuditReport> {
        self.dek().await?;
        self.reconciler.audit().await
    }

    /// Drop the DEK and the decrypted working set.
    pub async fn lock(&self) {
        self.envelope.lock().await.lock();
        *self.working.write().await = None;
        tracing::info!(user = %self.user, "vault locked");
    }

    /// Lock and wipe this user's data from the local stores.
    pub async fn logout(&self) -> VaultResult<()> {
        self.envelope.lock().await.wipe();
        *self.working.write().await = None;
        self.cache.clear_user(&self.user).await?;
        tracing::info!(user = %self.user, "logged out, local data cleared");
        Ok(())
    }
}
