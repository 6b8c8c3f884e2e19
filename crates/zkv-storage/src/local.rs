//! On-device cache: four logical key/value stores holding opaque bytes.
//!
//! Backends:
//!   - **JSON file** (default): whole cache in memory, flushed atomically via
//!     temp+rename after every mutation.
//!   - **Memory**: process-lifetime only, used by tests and `local.backend = "memory"`.
//!   - **RocksDB** (behind the `rocksdb` feature): see [`crate::rocks`].
//!
//! All backends implement [`LocalStore`], so the session layer never knows
//! which one it is talking to.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use zkv_core::config::{expand_tilde, LocalConfig};
use zkv_core::{VaultError, VaultResult};

/// The logical stores kept on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocalStoreKind {
    /// The user's wrapped DEK record.
    WrappedKey,
    /// Local copy of the passphrase verifier hash. Never the passphrase itself.
    Passphrase,
    /// Space names the user has created.
    Spaces,
    /// Encrypted credential records keyed by id.
    Credentials,
}

impl LocalStoreKind {
    pub const ALL: [LocalStoreKind; 4] = [
        LocalStoreKind::WrappedKey,
        LocalStoreKind::Passphrase,
        LocalStoreKind::Spaces,
        LocalStoreKind::Credentials,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LocalStoreKind::WrappedKey => "wrapped_key",
            LocalStoreKind::Passphrase => "passphrase",
            LocalStoreKind::Spaces => "spaces",
            LocalStoreKind::Credentials => "credentials",
        }
    }
}

impl std::fmt::Display for LocalStoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Async key/value access to the on-device cache.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, store: LocalStoreKind, key: &str) -> VaultResult<Option<Vec<u8>>>;

    async fn put(&self, store: LocalStoreKind, key: &str, value: Vec<u8>) -> VaultResult<()>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, store: LocalStoreKind, key: &str) -> VaultResult<()>;

    /// Every `(key, value)` pair in `store`, ordered by key.
    async fn get_all(&self, store: LocalStoreKind) -> VaultResult<Vec<(String, Vec<u8>)>>;

    async fn clear(&self, store: LocalStoreKind) -> VaultResult<()>;

    /// Wipe every store (logout).
    async fn clear_all(&self) -> VaultResult<()> {
        for kind in LocalStoreKind::ALL {
            self.clear(kind).await?;
        }
        Ok(())
    }
}

type Tables = BTreeMap<LocalStoreKind, BTreeMap<String, Vec<u8>>>;

// ── Memory backend ───────────────────────────────────────────────────────────

/// In-memory cache; contents vanish with the process.
#[derive(Default)]
pub struct MemoryLocalStore {
    tables: RwLock<Tables>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self, store: LocalStoreKind, key: &str) -> VaultResult<Option<Vec<u8>>> {
        let tables = self.tables.read().await;
        Ok(tables.get(&store).and_then(|t| t.get(key)).cloned())
    }

    async fn put(&self, store: LocalStoreKind, key: &str, value: Vec<u8>) -> VaultResult<()> {
        let mut tables = self.tables.write().await;
        tables.entry(store).or_default().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, store: LocalStoreKind, key: &str) -> VaultResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(t) = tables.get_mut(&store) {
            t.remove(key);
        }
        Ok(())
    }

    async fn get_all(&self, store: LocalStoreKind) -> VaultResult<Vec<(String, Vec<u8>)>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&store)
            .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn clear(&self, store: LocalStoreKind) -> VaultResult<()> {
        self.tables.write().await.remove(&store);
        Ok(())
    }
}

// ── JSON file backend ────────────────────────────────────────────────────────

/// On-disk layout: `{ "stores": { "<store>": { "<key>": "<base64>" } } }`
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    stores: BTreeMap<String, BTreeMap<String, String>>,
}

/// JSON-file cache. Every mutation rewrites the file before returning, so a
/// successful `put` is durable once it resolves.
pub struct JsonFileLocalStore {
    path: PathBuf,
    tables: Mutex<Tables>,
}

impl JsonFileLocalStore {
    /// Load or create a cache at `path`. A missing file is an empty cache.
    pub async fn open(path: &Path) -> VaultResult<Self> {
        let tables = match tokio::fs::read_to_string(path).await {
            Ok(content) => decode_file(&content, path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), "opened local cache");
        Ok(Self {
            path: path.to_path_buf(),
            tables: Mutex::new(tables),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `mutate` to a copy of the tables and swap it in only once the
    /// copy is on disk. `mutate` returns whether anything changed.
    async fn commit(&self, mutate: impl FnOnce(&mut Tables) -> bool) -> VaultResult<()> {
        let mut tables = self.tables.lock().await;
        let mut next = tables.clone();
        if !mutate(&mut next) {
            return Ok(());
        }
        self.flush(&next).await?;
        *tables = next;
        Ok(())
    }

    /// Atomic write: temp file, then rename over the real one.
    async fn flush(&self, tables: &Tables) -> VaultResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(&encode_file(tables))?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

fn decode_file(content: &str, path: &Path) -> VaultResult<Tables> {
    let file: CacheFile = serde_json::from_str(content)
        .map_err(|e| VaultError::Storage(format!("parsing {}: {e}", path.display())))?;

    let mut tables = Tables::new();
    for (name, entries) in file.stores {
        let Some(kind) = LocalStoreKind::ALL.into_iter().find(|k| k.name() == name) else {
            tracing::warn!(store = %name, "ignoring unknown store in local cache");
            continue;
        };
        let table = tables.entry(kind).or_default();
        for (key, value) in entries {
            let bytes = STANDARD.decode(&value).map_err(|e| {
                VaultError::Storage(format!("local cache entry {name}/{key} is not base64: {e}"))
            })?;
            table.insert(key, bytes);
        }
    }
    Ok(tables)
}

fn encode_file(tables: &Tables) -> CacheFile {
    let stores = tables
        .iter()
        .filter(|(_, t)| !t.is_empty())
        .map(|(kind, t)| {
            let entries = t
                .iter()
                .map(|(k, v)| (k.clone(), STANDARD.encode(v)))
                .collect();
            (kind.name().to_string(), entries)
        })
        .collect();
    CacheFile { stores }
}

#[async_trait]
impl LocalStore for JsonFileLocalStore {
    async fn get(&self, store: LocalStoreKind, key: &str) -> VaultResult<Option<Vec<u8>>> {
        let tables = self.tables.lock().await;
        Ok(tables.get(&store).and_then(|t| t.get(key)).cloned())
    }

    async fn put(&self, store: LocalStoreKind, key: &str, value: Vec<u8>) -> VaultResult<()> {
        self.commit(|tables| {
            tables.entry(store).or_default().insert(key.to_string(), value);
            true
        })
        .await
    }

    async fn delete(&self, store: LocalStoreKind, key: &str) -> VaultResult<()> {
        self.commit(|tables| {
            tables
                .get_mut(&store)
                .is_some_and(|t| t.remove(key).is_some())
        })
        .await
    }

    async fn get_all(&self, store: LocalStoreKind) -> VaultResult<Vec<(String, Vec<u8>)>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .get(&store)
            .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn clear(&self, store: LocalStoreKind) -> VaultResult<()> {
        self.commit(|tables| tables.remove(&store).is_some()).await
    }

    async fn clear_all(&self) -> VaultResult<()> {
        self.commit(|tables| {
            tables.clear();
            true
        })
        .await
    }
}

/// Open the backend named by `local.backend`.
///
/// `"rocksdb"` without the `rocksdb` feature falls back to the JSON backend
/// with a warning.
pub async fn open_local_store(cfg: &LocalConfig) -> VaultResult<Arc<dyn LocalStore>> {
    let path = expand_tilde(&cfg.path);
    match cfg.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryLocalStore::new())),
        "json" => Ok(Arc::new(JsonFileLocalStore::open(&path).await?)),
        #[cfg(feature = "rocksdb")]
        "rocksdb" => Ok(Arc::new(crate::rocks::RocksLocalStore::open(&path)?)),
        #[cfg(not(feature = "rocksdb"))]
        "rocksdb" => {
            tracing::warn!(
                "RocksDB not compiled in (missing 'rocksdb' feature), falling back to JSON backend"
            );
            let path = path.with_extension("json");
            Ok(Arc::new(JsonFileLocalStore::open(&path).await?))
        }
        other => Err(VaultError::Config(format!("unknown local.backend {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(store: &dyn LocalStore) {
        use LocalStoreKind::*;

        assert!(store.get(Credentials, "a").await.unwrap().is_none());
        store.put(Credentials, "b", b"two".to_vec()).await.unwrap();
        store.put(Credentials, "a", b"one".to_vec()).await.unwrap();
        store.put(Spaces, "work", Vec::new()).await.unwrap();

        assert_eq!(store.get(Credentials, "a").await.unwrap().unwrap(), b"one");
        let all = store.get_all(Credentials).await.unwrap();
        let keys: Vec<&str> = all.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);

        // Stores are independent
        assert!(store.get(WrappedKey, "a").await.unwrap().is_none());

        store.delete(Credentials, "a").await.unwrap();
        store.delete(Credentials, "missing").await.unwrap();
        assert_eq!(store.get_all(Credentials).await.unwrap().len(), 1);

        store.clear(Credentials).await.unwrap();
        assert!(store.get_all(Credentials).await.unwrap().is_empty());
        assert_eq!(store.get_all(Spaces).await.unwrap().len(), 1);

        store.clear_all().await.unwrap();
        assert!(store.get_all(Spaces).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_semantics() {
        exercise(&MemoryLocalStore::new()).await;
    }

    #[tokio::test]
    async fn test_json_store_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileLocalStore::open(&dir.path().join("cache.json"))
            .await
            .unwrap();
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_json_open_nonexistent_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileLocalStore::open(&dir.path().join("nested/cache.json"))
            .await
            .unwrap();
        assert!(store
            .get_all(LocalStoreKind::Credentials)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_json_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/cache.json");

        {
            let store = JsonFileLocalStore::open(&path).await.unwrap();
            store
                .put(LocalStoreKind::WrappedKey, "user-42", vec![0, 159, 146, 150])
                .await
                .unwrap();
            store
                .put(LocalStoreKind::Credentials, "id-1", b"{}".to_vec())
                .await
                .unwrap();
        }

        let reopened = JsonFileLocalStore::open(&path).await.unwrap();
        assert_eq!(
            reopened
                .get(LocalStoreKind::WrappedKey, "user-42")
                .await
                .unwrap()
                .unwrap(),
            vec![0, 159, 146, 150]
        );
        assert_eq!(
            reopened.get_all(LocalStoreKind::Credentials).await.unwrap().len(),
            1
        );
        assert!(!path.with_extension("tmp").exists(), "temp file must be renamed away");
    }

    #[tokio::test]
    async fn test_json_failed_flush_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = JsonFileLocalStore::open(&path).await.unwrap();
        store
            .put(LocalStoreKind::Credentials, "kept", b"k".to_vec())
            .await
            .unwrap();

        // A directory where the temp file should go makes every flush fail
        std::fs::create_dir(path.with_extension("tmp")).unwrap();

        assert!(store
            .put(LocalStoreKind::Credentials, "ghost", b"x".to_vec())
            .await
            .is_err());
        assert!(store
            .get(LocalStoreKind::Credentials, "ghost")
            .await
            .unwrap()
            .is_none());

        assert!(store.delete(LocalStoreKind::Credentials, "kept").await.is_err());
        assert!(store.clear_all().await.is_err());
        assert_eq!(
            store
                .get(LocalStoreKind::Credentials, "kept")
                .await
                .unwrap()
                .unwrap(),
            b"k"
        );

        std::fs::remove_dir(path.with_extension("tmp")).unwrap();
        let reopened = JsonFileLocalStore::open(&path).await.unwrap();
        let keys: Vec<String> = reopened
            .get_all(LocalStoreKind::Credentials)
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, ["kept"]);
    }

    #[tokio::test]
    async fn test_json_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = JsonFileLocalStore::open(&path).await;
        assert!(matches!(result, Err(VaultError::Storage(_))));
    }

    #[tokio::test]
    async fn test_open_local_store_by_backend() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LocalConfig {
            backend: "json".into(),
            path: dir.path().join("cache.json"),
        };
        let store = open_local_store(&cfg).await.unwrap();
        store
            .put(LocalStoreKind::Spaces, "main", Vec::new())
            .await
            .unwrap();
        assert!(cfg.path.exists());

        let bad = LocalConfig {
            backend: "sqlite".into(),
            ..cfg
        };
        assert!(matches!(
            open_local_store(&bad).await,
            Err(VaultError::Config(_))
        ));
    }
}
