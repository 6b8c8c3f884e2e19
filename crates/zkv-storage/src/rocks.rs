//! RocksDB-backed local cache.
//!
//! Keys are `"<store>/<key>"`; `get_all` and `clear` walk the store prefix.
//! Writes go straight to RocksDB and the WAL provides durability, so there is
//! nothing to flush.

use async_trait::async_trait;
use rocksdb::{Direction, IteratorMode, WriteBatch, DB};
use std::path::Path;
use zkv_core::{VaultError, VaultResult};

use crate::local::{LocalStore, LocalStoreKind};

pub struct RocksLocalStore {
    db: DB,
}

impl RocksLocalStore {
    /// Open or create a RocksDB cache at the given directory.
    pub fn open(db_path: &Path) -> VaultResult<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, db_path).map_err(|e| {
            VaultError::Storage(format!("opening RocksDB {}: {e}", db_path.display()))
        })?;
        Ok(Self { db })
    }

    fn scan(&self, store: LocalStoreKind) -> VaultResult<Vec<(String, Vec<u8>)>> {
        let prefix = store_prefix(store);
        let mut out = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
        {
            let (key, value) = item.map_err(rocks_err)?;
            let Some(rest) = key.strip_prefix(prefix.as_bytes()) else {
                break;
            };
            out.push((String::from_utf8_lossy(rest).into_owned(), value.into_vec()));
        }
        Ok(out)
    }
}

fn store_prefix(store: LocalStoreKind) -> String {
    format!("{}/", store.name())
}

fn full_key(store: LocalStoreKind, key: &str) -> String {
    format!("{}/{key}", store.name())
}

fn rocks_err(e: rocksdb::Error) -> VaultError {
    VaultError::Storage(format!("rocksdb: {e}"))
}

#[async_trait]
impl LocalStore for RocksLocalStore {
    async fn get(&self, store: LocalStoreKind, key: &str) -> VaultResult<Option<Vec<u8>>> {
        self.db.get(full_key(store, key)).map_err(rocks_err)
    }

    async fn put(&self, store: LocalStoreKind, key: &str, value: Vec<u8>) -> VaultResult<()> {
        self.db.put(full_key(store, key), value).map_err(rocks_err)
    }

    async fn delete(&self, store: LocalStoreKind, key: &str) -> VaultResult<()> {
        self.db.delete(full_key(store, key)).map_err(rocks_err)
    }

    async fn get_all(&self, store: LocalStoreKind) -> VaultResult<Vec<(String, Vec<u8>)>> {
        self.scan(store)
    }

    async fn clear(&self, store: LocalStoreKind) -> VaultResult<()> {
        let mut batch = WriteBatch::default();
        for (key, _) in self.scan(store)? {
            batch.delete(full_key(store, &key));
        }
        self.db.write(batch).map_err(rocks_err)
    }
}
