//! zkv-storage: remote record store over OpenDAL plus on-device cache backends

pub mod health;
pub mod local;
pub mod operator;
pub mod remote;
#[cfg(feature = "rocksdb")]
pub mod rocks;

pub use health::{check_health, is_healthy};
pub use local::{open_local_store, JsonFileLocalStore, LocalStore, LocalStoreKind, MemoryLocalStore};
pub use operator::{build_operator, S3Credentials};
pub use remote::{OpendalRemoteStore, RemoteListing, RemoteStore};
#[cfg(feature = "rocksdb")]
pub use rocks::RocksLocalStore;
