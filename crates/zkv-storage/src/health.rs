//! Remote store health: can we reach the vault's `users/` tree, and how many
//! vaults live there.

use anyhow::Result;
use opendal::ErrorKind;

use crate::remote::OpendalRemoteStore;

/// List the user directories under the store prefix. Returns the number of
/// vaults found; an absent tree is a reachable, empty store.
pub async fn check_health(store: &OpendalRemoteStore) -> Result<usize> {
    let root = store.users_root();
    match store.operator().list(&root).await {
        Ok(entries) => Ok(entries
            .iter()
            .filter(|e| e.path() != root && e.path().ends_with('/'))
            .count()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(anyhow::anyhow!("remote store health check failed at {root}: {e}")),
    }
}

/// Returns true if the remote store is reachable (non-panicking)
pub async fn is_healthy(store: &OpendalRemoteStore) -> bool {
    check_health(store).await.is_ok()
}
