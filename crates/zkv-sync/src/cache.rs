//! Typed view over the on-device [`LocalStore`].
//!
//! Layout inside the logical stores:
//!   - `WrappedKey`:  user id → JSON [`WrappedKeyRecord`]
//!   - `Passphrase`:  user id → verifier hash (UTF-8 PHC string)
//!   - `Spaces`:      user id → JSON array of space names
//!   - `Credentials`: record id → JSON [`CredentialRecord`]

use std::collections::BTreeSet;
use std::sync::Arc;
use zkv_core::{CredentialRecord, UserIdentity, VaultError, VaultResult, WrappedKeyRecord};
use zkv_storage::{LocalStore, LocalStoreKind};

/// Credential records read back from the cache.
#[derive(Debug, Default)]
pub struct CachedRecords {
    pub records: Vec<CredentialRecord>,
    /// Keys whose bytes no longer parse as a record.
    pub corrupt: Vec<String>,
}

#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn LocalStore>,
}

impl LocalCache {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    pub async fn wrapped_key(&self, user: &UserIdentity) -> VaultResult<Option<WrappedKeyRecord>> {
        let Some(bytes) = self.store.get(LocalStoreKind::WrappedKey, user.as_str()).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // Treat as absent so the remote copy can repopulate it.
                tracing::warn!(user = %user, "discarding unparseable cached key record: {e}");
                Ok(None)
            }
        }
    }

    pub async fn put_wrapped_key(&self, record: &WrappedKeyRecord) -> VaultResult<()> {
        let bytes = serde_json::to_vec(record)?;
        self.store
            .put(LocalStoreKind::WrappedKey, record.user_id.as_str(), bytes)
            .await
    }

    pub async fn verifier(&self, user: &UserIdentity) -> VaultResult<Option<String>> {
        let bytes = self.store.get(LocalStoreKind::Passphrase, user.as_str()).await?;
        Ok(bytes.and_then(|b| String::from_utf8(b).ok()))
    }

    pub async fn put_verifier(&self, user: &UserIdentity, hash: &str) -> VaultResult<()> {
        self.store
            .put(LocalStoreKind::Passphrase, user.as_str(), hash.as_bytes().to_vec())
            .await
    }

    /// All cached records owned by `user`, ordered by creation time.
    pub async fn credentials(&self, user: &UserIdentity) -> VaultResult<CachedRecords> {
        let mut out = CachedRecords::default();
        for (key, bytes) in self.store.get_all(LocalStoreKind::Credentials).await? {
            match serde_json::from_slice::<CredentialRecord>(&bytes) {
                Ok(record) if &record.user_id == user => out.records.push(record),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(id = %key, "unparseable cached credential: {e}");
                    out.corrupt.push(key);
                }
            }
        }
        out.records
            .sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(out)
    }

    /// Ids of every cached credential entry for `user`, parseable or not.
    pub async fn credential_ids(&self, user: &UserIdentity) -> VaultResult<BTreeSet<String>> {
        let cached = self.credentials(user).await?;
        Ok(cached
            .records
            .into_iter()
            .map(|r| r.id)
            .chain(cached.corrupt)
            .collect())
    }

    pub async fn put_credential(&self, record: &CredentialRecord) -> VaultResult<()> {
        if record.id.is_empty() {
            return Err(VaultError::InvalidInput("credential id is empty".into()));
        }
        let bytes = serde_json::to_vec(record)?;
        self.store
            .put(LocalStoreKind::Credentials, &record.id, bytes)
            .await
    }

    pub async fn delete_credential(&self, id: &str) -> VaultResult<()> {
        self.store.delete(LocalStoreKind::Credentials, id).await
    }

    /// Stored space list for `user`; `None` when nothing has been stored yet.
    pub async fn spaces(&self, user: &UserIdentity) -> VaultResult<Option<Vec<String>>> {
        let Some(bytes) = self.store.get(LocalStoreKind::Spaces, user.as_str()).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub async fn put_spaces(&self, user: &UserIdentity, spaces: &[String]) -> VaultResult<()> {
        let bytes = serde_json::to_vec(spaces)?;
        self.store
            .put(LocalStoreKind::Spaces, user.as_str(), bytes)
            .await
    }

    /// Remove everything cached for `user`. Other users sharing the store
    /// are untouched, and so are corrupt entries, which cannot be attributed.
    pub async fn clear_user(&self, user: &UserIdentity) -> VaultResult<()> {
        for kind in [
            LocalStoreKind::WrappedKey,
            LocalStoreKind::Passphrase,
            LocalStoreKind::Spaces,
        ] {
            self.store.delete(kind, user.as_str()).await?;
        }
        for record in self.credentials(user).await?.records {
            self.store
                .delete(LocalStoreKind::Credentials, &record.id)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkv_core::EncryptedField;
    use zkv_storage::MemoryLocalStore;

    fn cache() -> LocalCache {
        LocalCache::new(Arc::new(MemoryLocalStore::new()))
    }

    fn user(id: &str) -> UserIdentity {
        UserIdentity::new(id).unwrap()
    }

    fn record(owner: &UserIdentity, id: &str) -> CredentialRecord {
        let f = EncryptedField {
            ciphertext: vec![1; 17],
            nonce: vec![2; 12],
        };
        CredentialRecord {
            id: id.into(),
            user_id: owner.clone(),
            space: "main".into(),
            website: None,
            username: f.clone(),
            password: f,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[tokio::test]
    async fn test_credentials_filtered_by_owner() {
        let c = cache();
        c.put_credential(&record(&user("alice"), "a1")).await.unwrap();
        c.put_credential(&record(&user("bob"), "b1")).await.unwrap();

        let alice = c.credentials(&user("alice")).await.unwrap();
        assert_eq!(alice.records.len(), 1);
        assert_eq!(alice.records[0].id, "a1");
    }

    #[tokio::test]
    async fn test_corrupt_entry_reported() {
        let store = Arc::new(MemoryLocalStore::new());
        let c = LocalCache::new(store.clone());
        c.put_credential(&record(&user("u"), "ok")).await.unwrap();
        store
            .put(LocalStoreKind::Credentials, "broken", b"{{{".to_vec())
            .await
            .unwrap();

        let cached = c.credentials(&user("u")).await.unwrap();
        assert_eq!(cached.records.len(), 1);
        assert_eq!(cached.corrupt, ["broken"]);

        let ids = c.credential_ids(&user("u")).await.unwrap();
        assert!(ids.contains("ok") && ids.contains("broken"));
    }

    #[tokio::test]
    async fn test_verifier_and_spaces() {
        let c = cache();
        let u = user("u");
        assert!(c.verifier(&u).await.unwrap().is_none());
        assert!(c.spaces(&u).await.unwrap().is_none());

        c.put_verifier(&u, "$argon2id$stub").await.unwrap();
        c.put_spaces(&u, &["main".into(), "work".into()]).await.unwrap();

        assert_eq!(c.verifier(&u).await.unwrap().as_deref(), Some("$argon2id$stub"));
        assert_eq!(c.spaces(&u).await.unwrap().unwrap(), ["main", "work"]);

        c.clear_user(&u).await.unwrap();
        assert!(c.verifier(&u).await.unwrap().is_none());
        assert!(c.spaces(&u).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_user_leaves_other_users() {
        let c = cache();
        let (alice, bob) = (user("alice"), user("bob"));
        for u in [&alice, &bob] {
            c.put_verifier(u, "$argon2id$stub").await.unwrap();
            c.put_spaces(u, &["main".into()]).await.unwrap();
        }
        c.put_credential(&record(&alice, "a1")).await.unwrap();
        c.put_credential(&record(&bob, "b1")).await.unwrap();
        c.put_credential(&record(&bob, "b2")).await.unwrap();

        c.clear_user(&bob).await.unwrap();

        assert!(c.verifier(&bob).await.unwrap().is_none());
        assert!(c.credentials(&bob).await.unwrap().records.is_empty());
        assert!(c.verifier(&alice).await.unwrap().is_some());
        assert!(c.spaces(&alice).await.unwrap().is_some());
        let kept: Vec<String> = c
            .credentials(&alice)
            .await
            .unwrap()
            .records
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(kept, ["a1"]);
    }

    #[tokio::test]
    async fn test_unparseable_key_record_is_absent() {
        let store = Arc::new(MemoryLocalStore::new());
        store
            .put(LocalStoreKind::WrappedKey, "u", b"not json".to_vec())
            .await
            .unwrap();
        let c = LocalCache::new(store);
        assert!(c.wrapped_key(&user("u")).await.unwrap().is_none());
    }
}
