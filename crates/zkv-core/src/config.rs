use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{VaultError, VaultResult};

/// Recommended PBKDF2 round count for KEK derivation.
pub const RECOMMENDED_KDF_ITERATIONS: u32 = 200_000;

/// Top-level configuration (loaded from zkv.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub log: LogConfig,
    pub storage: StorageConfig,
    pub local: LocalConfig,
    pub crypto: CryptoConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Remote store location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend: "s3", "fs", or "memory"
    pub backend: String,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Root directory for the "fs" backend
    pub root: PathBuf,
    /// Key prefix under which all vault objects live
    pub prefix: String,
    /// Enforce HTTPS for S3 connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
}

/// On-device cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Backend: "json", "rocksdb" (requires the rocksdb feature), or "memory"
    pub backend: String,
    /// Path of the JSON file or RocksDB directory
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PBKDF2-HMAC-SHA256 rounds for new wrapped keys (default: 200000)
    pub kdf_iterations: u32,
    /// Argon2id memory cost in KiB for the passphrase verifier (default: 19456)
    pub verifier_mem_cost_kib: u32,
    /// Argon2id time cost (default: 2)
    pub verifier_time_cost: u32,
    /// Argon2id parallelism (default: 1)
    pub verifier_parallelism: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Per-call timeout for remote store operations, in milliseconds
    pub remote_timeout_ms: u64,
    /// Immediate retries after a transient remote failure (default: 1)
    pub max_retries: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "fs".into(),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "zkv".into(),
            root: PathBuf::from("~/.local/share/zkv/remote"),
            prefix: "vault".into(),
            enforce_tls: false,
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            backend: "json".into(),
            path: PathBuf::from("~/.local/share/zkv/cache.json"),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: RECOMMENDED_KDF_ITERATIONS,
            verifier_mem_cost_kib: 19456,
            verifier_time_cost: 2,
            verifier_parallelism: 1,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_timeout_ms: 10_000,
            max_retries: 1,
        }
    }
}

impl VaultConfig {
    /// Load a config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> VaultResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| VaultError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work; warn on settings that weaken the vault.
    pub fn validate(&self) -> VaultResult<()> {
        if self.crypto.kdf_iterations == 0 {
            return Err(VaultError::Config("crypto.kdf_iterations must be > 0".into()));
        }
        if self.crypto.kdf_iterations < RECOMMENDED_KDF_ITERATIONS {
            tracing::warn!(
                iterations = self.crypto.kdf_iterations,
                recommended = RECOMMENDED_KDF_ITERATIONS,
                "crypto.kdf_iterations below recommended minimum"
            );
        }
        match self.storage.backend.as_str() {
            "s3" | "fs" | "memory" => {}
            other => {
                return Err(VaultError::Config(format!(
                    "unknown storage.backend {other:?} (expected s3, fs, or memory)"
                )))
            }
        }
        match self.local.backend.as_str() {
            "json" | "rocksdb" | "memory" => {}
            other => {
                return Err(VaultError::Config(format!(
                    "unknown local.backend {other:?} (expected json, rocksdb, or memory)"
                )))
            }
        }
        Ok(())
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}
