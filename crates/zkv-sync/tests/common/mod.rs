//! Shared fixtures: in-memory stores, fast crypto settings, and fault-injecting
//! store wrappers.

#![allow(dead_code)]

use async_trait::async_trait;
use opendal::Operator;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use zkv_core::{CredentialRecord, UserIdentity, VaultError, VaultResult, WrappedKeyRecord};
use zkv_crypto::{KdfParams, VerifierParams};
use zkv_storage::{
    LocalStore, LocalStoreKind, MemoryLocalStore, OpendalRemoteStore, RemoteListing, RemoteStore,
};
use zkv_sync::envelope::EnvelopeSettings;
use zkv_sync::{RetryPolicy, SessionSettings, VaultSession};

pub const PASSPHRASE: &str = "Tr0ub4dor&3";
pub const USER: &str = "user-42";
pub const FAST_ITERATIONS: u32 = 1_000;

pub fn user() -> UserIdentity {
    UserIdentity::new(USER).unwrap()
}

pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        envelope: EnvelopeSettings {
            kdf: KdfParams {
                iterations: FAST_ITERATIONS,
            },
            verifier: VerifierParams {
                mem_cost_kib: 1024,
                time_cost: 1,
                parallelism: 1,
            },
            retry: RetryPolicy {
                timeout: Duration::from_secs(5),
                max_retries: 1,
            },
        },
    }
}

pub fn memory_remote() -> Arc<OpendalRemoteStore> {
    let op = Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish();
    Arc::new(OpendalRemoteStore::new(op, "vault"))
}

/// A session for [`USER`] on a device with the given stores.
pub fn session(local: Arc<dyn LocalStore>, remote: Arc<dyn RemoteStore>) -> VaultSession {
    VaultSession::new(user(), local, remote, fast_settings())
}

/// A session for another user sharing the same stores.
pub fn session_as(
    id: &str,
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
) -> VaultSession {
    VaultSession::new(UserIdentity::new(id).unwrap(), local, remote, fast_settings())
}

/// A session on a brand new device (empty memory cache).
pub fn fresh_device(remote: Arc<dyn RemoteStore>) -> VaultSession {
    session(Arc::new(MemoryLocalStore::new()), remote)
}

/// Remote wrapper that fails the next N calls of selected operations with
/// `TransientIo`. A non-zero `server_time` overwrites the timestamps of
/// created records, the way a server clock would.
pub struct FlakyRemote {
    inner: Arc<dyn RemoteStore>,
    pub fail_creates: AtomicU32,
    pub fail_deletes: AtomicU32,
    pub create_calls: AtomicU32,
    pub server_time: AtomicU64,
}

impl FlakyRemote {
    pub fn new(inner: Arc<dyn RemoteStore>) -> Self {
        Self {
            inner,
            fail_creates: AtomicU32::new(0),
            fail_deletes: AtomicU32::new(0),
            create_calls: AtomicU32::new(0),
            server_time: AtomicU64::new(0),
        }
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RemoteStore for FlakyRemote {
    async fn create_credential(&self, mut record: CredentialRecord) -> VaultResult<CredentialRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.fail_creates) {
            return Err(VaultError::TransientIo("injected create failure".into()));
        }
        let now = self.server_time.load(Ordering::SeqCst);
        if now != 0 {
            record.created_at = now;
            record.updated_at = now;
        }
        self.inner.create_credential(record).await
    }

    async fn list_credentials(&self, user: &UserIdentity) -> VaultResult<Vec<CredentialRecord>> {
        self.inner.list_credentials(user).await
    }

    async fn scan_credentials(&self, user: &UserIdentity) -> VaultResult<RemoteListing> {
        self.inner.scan_credentials(user).await
    }

    async fn delete_credential(&self, user: &UserIdentity, id: &str) -> VaultResult<()> {
        if Self::take(&self.fail_deletes) {
            return Err(VaultError::TransientIo("injected delete failure".into()));
        }
        self.inner.delete_credential(user, id).await
    }

    async fn get_wrapped_key(&self, user: &UserIdentity) -> VaultResult<Option<WrappedKeyRecord>> {
        self.inner.get_wrapped_key(user).await
    }

    async fn upsert_wrapped_key(&self, record: WrappedKeyRecord) -> VaultResult<()> {
        self.inner.upsert_wrapped_key(record).await
    }
}

/// Local store that silently drops credential writes for one id.
pub struct LossyLocal {
    inner: MemoryLocalStore,
    drop_id: String,
}

impl LossyLocal {
    pub fn new(drop_id: impl Into<String>) -> Self {
        Self {
            inner: MemoryLocalStore::new(),
            drop_id: drop_id.into(),
        }
    }
}

#[async_trait]
impl LocalStore for LossyLocal {
    async fn get(&self, store: LocalStoreKind, key: &str) -> VaultResult<Option<Vec<u8>>> {
        self.inner.get(store, key).await
    }

    async fn put(&self, store: LocalStoreKind, key: &str, value: Vec<u8>) -> VaultResult<()> {
        if store == LocalStoreKind::Credentials && key == self.drop_id {
            return Ok(());
        }
        self.inner.put(store, key, value).await
    }

    async fn delete(&self, store: LocalStoreKind, key: &str) -> VaultResult<()> {
        self.inner.delete(store, key).await
    }

    async fn get_all(&self, store: LocalStoreKind) -> VaultResult<Vec<(String, Vec<u8>)>> {
        self.inner.get_all(store).await
    }

    async fn clear(&self, store: LocalStoreKind) -> VaultResult<()> {
        self.inner.clear(store).await
    }
}
