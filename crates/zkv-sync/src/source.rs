//! Where encrypted records come from: the device cache or the remote store.

use async_trait::async_trait;
use std::sync::Arc;
use zkv_core::{CredentialRecord, UserIdentity, VaultResult};
use zkv_storage::RemoteStore;

use crate::cache::LocalCache;
use crate::retry::RetryPolicy;

/// Records fetched from one source.
#[derive(Debug, Default)]
pub struct Batch {
    pub records: Vec<CredentialRecord>,
    /// Entries that exist but could not be parsed.
    pub unreadable: Vec<String>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.unreadable.is_empty()
    }
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, user: &UserIdentity) -> VaultResult<Batch>;
}

pub struct LocalSource {
    cache: LocalCache,
}

impl LocalSource {
    pub fn new(cache: LocalCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl RecordSource for LocalSource {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch(&self, user: &UserIdentity) -> VaultResult<Batch> {
        let cached = self.cache.credentials(user).await?;
        Ok(Batch {
            records: cached.records,
            unreadable: cached.corrupt,
        })
    }
}

pub struct RemoteSource {
    remote: Arc<dyn RemoteStore>,
    retry: RetryPolicy,
}

impl RemoteSource {
    pub fn new(remote: Arc<dyn RemoteStore>, retry: RetryPolicy) -> Self {
        Self { remote, retry }
    }
}

#[async_trait]
impl RecordSource for RemoteSource {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn fetch(&self, user: &UserIdentity) -> VaultResult<Batch> {
        let listing = self
            .retry
            .run("list_credentials", || self.remote.scan_credentials(user))
            .await?;
        Ok(Batch {
            records: listing.records,
            unreadable: listing.unreadable,
        })
    }
}
