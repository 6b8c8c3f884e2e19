//! Local-first reconciliation between the device cache and the remote store.
//!
//! Reads: a non-empty local cache is authoritative and the remote is not
//! queried. An empty cache is bootstrapped from the remote, verbatim, and the
//! result is checked id-for-id. Writes: local put is the durability point,
//! the remote create follows, and a failed remote create rolls the local put
//! back.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use zkv_core::{CredentialRecord, UserIdentity, VaultError, VaultResult};
use zkv_storage::RemoteStore;

use crate::cache::LocalCache;
use crate::retry::RetryPolicy;
use crate::source::{Batch, LocalSource, RecordSource, RemoteSource};

/// Which source produced a loaded batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    /// Bootstrapped from the remote into an empty cache.
    Remote,
    /// Nothing stored anywhere.
    Empty,
}

#[derive(Debug)]
pub struct Loaded {
    pub origin: Origin,
    pub records: Vec<CredentialRecord>,
    pub unreadable: Vec<String>,
}

/// Result of a clean [`Reconciler::audit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    pub local: usize,
    pub remote: usize,
    /// Created this session and not yet compared against a remote listing.
    pub pending: usize,
    /// Remote objects that exist but do not parse; not compared.
    pub remote_unreadable: Vec<String>,
}

/// Per-record-id async locks. Entries nobody holds are pruned on each acquire.
#[derive(Default)]
struct IdLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdLocks {
    async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct Reconciler {
    user: UserIdentity,
    cache: LocalCache,
    remote: Arc<dyn RemoteStore>,
    retry: RetryPolicy,
    local_source: LocalSource,
    remote_source: RemoteSource,
    created_since_fetch: Mutex<BTreeSet<String>>,
    id_locks: IdLocks,
}

impl Reconciler {
    pub fn new(
        user: UserIdentity,
        cache: LocalCache,
        remote: Arc<dyn RemoteStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            local_source: LocalSource::new(cache.clone()),
            remote_source: RemoteSource::new(remote.clone(), retry),
            user,
            cache,
            remote,
            retry,
            created_since_fetch: Mutex::new(BTreeSet::new()),
            id_locks: IdLocks::default(),
        }
    }

    /// Load the user's encrypted records, local first.
    pub async fn load(&self) -> VaultResult<Loaded> {
        let local = self.local_source.fetch(&self.user).await?;
        if !local.is_empty() {
            tracing::debug!(
                source = self.local_source.name(),
                records = local.records.len(),
                "working set from local cache"
            );
            return Ok(Loaded {
                origin: Origin::Local,
                records: local.records,
                unreadable: local.unreadable,
            });
        }

        let remote = self.fetch_remote().await?;
        if remote.is_empty() {
            tracing::debug!("no records locally or remotely");
            return Ok(Loaded {
                origin: Origin::Empty,
                records: Vec::new(),
                unreadable: Vec::new(),
            });
        }

        for record in &remote.records {
            self.cache.put_credential(record).await?;
        }
        tracing::info!(
            source = self.remote_source.name(),
            records = remote.records.len(),
            "bootstrapped local cache from remote"
        );

        let remote_ids: BTreeSet<String> = remote.records.iter().map(|r| r.id.clone()).collect();
        let local_ids = self.cache.credential_ids(&self.user).await?;
        check_agreement(&local_ids, &remote_ids, &BTreeSet::new())?;

        Ok(Loaded {
            origin: Origin::Remote,
            records: remote.records,
            unreadable: remote.unreadable,
        })
    }

    async fn fetch_remote(&self) -> VaultResult<Batch> {
        let batch = self.remote_source.fetch(&self.user).await?;
        self.created_since_fetch.lock().await.clear();
        Ok(batch)
    }

    /// Persist a new record: local put, then remote create. A remote failure
    /// (after the retry policy) removes the local copy again.
    pub async fn create(&self, record: CredentialRecord) -> VaultResult<CredentialRecord> {
        let _guard = self.id_locks.acquire(&record.id).await;

        self.cache.put_credential(&record).await?;

        let remote = self.remote.clone();
        let result = self
            .retry
            .run("create_credential", || remote.create_credential(record.clone()))
            .await;

        match result {
            Ok(stored) => {
                if stored != record {
                    // Keep the cache identical to what the remote now holds
                    if stored.id != record.id {
                        self.cache.delete_credential(&record.id).await?;
                    }
                    self.cache.put_credential(&stored).await?;
                }
                self.created_since_fetch
                    .lock()
                    .await
                    .insert(stored.id.clone());
                tracing::debug!(id = %stored.id, "credential persisted");
                Ok(stored)
            }
            Err(e) => {
                tracing::warn!(id = %record.id, error = %e, "remote create failed, rolling back local copy");
                if let Err(rollback) = self.cache.delete_credential(&record.id).await {
                    tracing::error!(id = %record.id, error = %rollback, "local rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Remove a record from the remote store, then from the local cache.
    pub async fn delete(&self, id: &str) -> VaultResult<()> {
        let _guard = self.id_locks.acquire(id).await;

        let remote = self.remote.clone();
        let user = self.user.clone();
        self.retry
            .run("delete_credential", || remote.delete_credential(&user, id))
            .await?;
        self.cache.delete_credential(id).await?;
        self.created_since_fetch.lock().await.remove(id);
        tracing::debug!(id, "credential deleted");
        Ok(())
    }

    /// Compare local ids with a fresh remote listing. Records created since
    /// the previous remote fetch are not counted against either side.
    pub async fn audit(&self) -> VaultResult<AuditReport> {
        let pending = self.created_since_fetch.lock().await.clone();
        let remote = self.remote_source.fetch(&self.user).await?;
        let remote_ids: BTreeSet<String> = remote.records.iter().map(|r| r.id.clone()).collect();
        let local_ids = self.cache.credential_ids(&self.user).await?;

        let mut excluded = pending.clone();
        excluded.extend(remote.unreadable.iter().cloned());
        check_agreement(&local_ids, &remote_ids, &excluded)?;

        // Anything pending that the remote now lists has been observed.
        self.created_since_fetch
            .lock()
            .await
            .retain(|id| !remote_ids.contains(id));

        Ok(AuditReport {
            local: local_ids.len(),
            remote: remote_ids.len(),
            pending: pending.len(),
            remote_unreadable: remote.unreadable,
        })
    }
}

fn check_agreement(
    local: &BTreeSet<String>,
    remote: &BTreeSet<String>,
    excluded: &BTreeSet<String>,
) -> VaultResult<()> {
    let local_only: Vec<String> = local
        .difference(remote)
        .filter(|id| !excluded.contains(*id))
        .cloned()
        .collect();
    let remote_only: Vec<String> = remote
        .difference(local)
        .filter(|id| !excluded.contains(*id))
        .cloned()
        .collect();

    if local_only.is_empty() && remote_only.is_empty() {
        return Ok(());
    }
    tracing::error!(
        ?local_only,
        ?remote_only,
        "local cache and remote store disagree"
    );
    Err(VaultError::PersistenceInvariantViolation {
        local_only,
        remote_only,
    })
}
