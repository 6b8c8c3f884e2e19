//! Remote store: the server side of the vault, which only ever sees ciphertext.
//!
//! Object layout under the configured prefix:
//! ```text
//! {prefix}/users/{b64url(user)}/key.json
//! {prefix}/users/{b64url(user)}/credentials/{id}.json
//! ```

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use opendal::{ErrorKind, Operator};
use std::collections::BTreeSet;
use zkv_core::{CredentialRecord, UserIdentity, VaultError, VaultResult, WrappedKeyRecord};

/// One listing of a user's remote records.
#[derive(Debug, Default)]
pub struct RemoteListing {
    pub records: Vec<CredentialRecord>,
    /// Ids of credential objects that do not parse.
    pub unreadable: Vec<String>,
}

/// Async access to the remote record store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Persist a new record. The record id is chosen by the client.
    async fn create_credential(&self, record: CredentialRecord) -> VaultResult<CredentialRecord>;

    async fn list_credentials(&self, user: &UserIdentity) -> VaultResult<Vec<CredentialRecord>>;

    /// Deleting a record that does not exist succeeds.
    async fn delete_credential(&self, user: &UserIdentity, id: &str) -> VaultResult<()>;

    async fn get_wrapped_key(&self, user: &UserIdentity) -> VaultResult<Option<WrappedKeyRecord>>;

    async fn upsert_wrapped_key(&self, record: WrappedKeyRecord) -> VaultResult<()>;

    /// Like [`RemoteStore::list_credentials`], but also names the objects
    /// that exist and fail to parse.
    async fn scan_credentials(&self, user: &UserIdentity) -> VaultResult<RemoteListing> {
        Ok(RemoteListing {
            records: self.list_credentials(user).await?,
            unreadable: Vec::new(),
        })
    }

    async fn get_verifier_hash(&self, user: &UserIdentity) -> VaultResult<Option<String>> {
        Ok(self
            .get_wrapped_key(user)
            .await?
            .map(|record| record.verifier_hash))
    }

    /// Distinct spaces across the user's records, sorted.
    async fn list_spaces(&self, user: &UserIdentity) -> VaultResult<Vec<String>> {
        let spaces: BTreeSet<String> = self
            .list_credentials(user)
            .await?
            .into_iter()
            .map(|record| record.space)
            .collect();
        Ok(spaces.into_iter().collect())
    }
}

/// [`RemoteStore`] over any OpenDAL operator (S3, filesystem, memory).
#[derive(Clone)]
pub struct OpendalRemoteStore {
    op: Operator,
    prefix: String,
}

impl OpendalRemoteStore {
    pub fn new(op: Operator, prefix: &str) -> Self {
        Self {
            op,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Directory holding one subdirectory per vault user.
    pub fn users_root(&self) -> String {
        if self.prefix.is_empty() {
            "users/".to_string()
        } else {
            format!("{}/users/", self.prefix)
        }
    }

    fn user_dir(&self, user: &UserIdentity) -> String {
        let encoded = URL_SAFE_NO_PAD.encode(user.as_bytes());
        format!("{}{encoded}/", self.users_root())
    }

    fn key_path(&self, user: &UserIdentity) -> String {
        format!("{}key.json", self.user_dir(user))
    }

    fn credentials_dir(&self, user: &UserIdentity) -> String {
        format!("{}credentials/", self.user_dir(user))
    }

    fn credential_path(&self, user: &UserIdentity, id: &str) -> VaultResult<String> {
        if id.is_empty() || id.contains('/') || id.contains("..") {
            return Err(VaultError::InvalidInput(format!("invalid credential id {id:?}")));
        }
        Ok(format!("{}{id}.json", self.credentials_dir(user)))
    }

    async fn read_optional(&self, path: &str) -> VaultResult<Option<Vec<u8>>> {
        match self.op.read(path).await {
            Ok(data) => Ok(Some(data.to_bytes().to_vec())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err("reading", path, e)),
        }
    }
}

/// Anything OpenDAL reports other than NotFound is treated as retryable.
fn io_err(action: &str, path: &str, e: opendal::Error) -> VaultError {
    VaultError::TransientIo(format!("{action} {path}: {e}"))
}

#[async_trait]
impl RemoteStore for OpendalRemoteStore {
    async fn create_credential(&self, record: CredentialRecord) -> VaultResult<CredentialRecord> {
        let path = self.credential_path(&record.user_id, &record.id)?;
        let json = serde_json::to_vec_pretty(&record)?;
        self.op
            .write(&path, json)
            .await
            .map_err(|e| io_err("writing", &path, e))?;
        tracing::debug!(id = %record.id, "credential stored remotely");
        Ok(record)
    }

    async fn list_credentials(&self, user: &UserIdentity) -> VaultResult<Vec<CredentialRecord>> {
        Ok(self.scan_credentials(user).await?.records)
    }

    async fn scan_credentials(&self, user: &UserIdentity) -> VaultResult<RemoteListing> {
        let dir = self.credentials_dir(user);
        let entries = match self.op.list(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RemoteListing::default()),
            Err(e) => return Err(io_err("listing", &dir, e)),
        };

        let mut listing = RemoteListing::default();
        for entry in entries {
            let path = entry.path();
            let Some(id) = path
                .rsplit('/')
                .next()
                .and_then(|name| name.strip_suffix(".json"))
            else {
                continue; // directory markers
            };
            let Some(data) = self.read_optional(path).await? else {
                continue; // deleted between list and read
            };
            match serde_json::from_slice::<CredentialRecord>(&data) {
                Ok(record) if &record.user_id == user => listing.records.push(record),
                Ok(_) => tracing::warn!(%path, "skipping record owned by another user"),
                Err(e) => {
                    tracing::warn!(%path, "unparseable remote record: {e}");
                    listing.unreadable.push(id.to_string());
                }
            }
        }
        listing
            .records
            .sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        listing.unreadable.sort();
        Ok(listing)
    }

    async fn delete_credential(&self, user: &UserIdentity, id: &str) -> VaultResult<()> {
        let path = self.credential_path(user, id)?;
        self.op
            .delete(&path)
            .await
            .map_err(|e| io_err("deleting", &path, e))
    }

    async fn get_wrapped_key(&self, user: &UserIdentity) -> VaultResult<Option<WrappedKeyRecord>> {
        let path = self.key_path(user);
        let Some(data) = self.read_optional(&path).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&data) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(%path, "unparseable key record: {e}");
                Err(VaultError::WrongPassphraseOrCorruptKey)
            }
        }
    }

    async fn upsert_wrapped_key(&self, record: WrappedKeyRecord) -> VaultResult<()> {
        let path = self.key_path(&record.user_id);
        let json = serde_json::to_vec_pretty(&record)?;
        self.op
            .write(&path, json)
            .await
            .map(|_| ())
            .map_err(|e| io_err("writing", &path, e))
    }
}
