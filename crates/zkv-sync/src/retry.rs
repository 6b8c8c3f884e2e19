//! Timeout + immediate-retry policy for remote store calls.

use std::future::Future;
use std::time::Duration;
use zkv_core::config::SyncConfig;
use zkv_core::{VaultError, VaultResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Per-attempt deadline
    pub timeout: Duration,
    /// Extra attempts after a transient failure
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &SyncConfig) -> Self {
        Self {
            timeout: Duration::from_millis(cfg.remote_timeout_ms),
            max_retries: cfg.max_retries,
        }
    }

    /// Run `op` under the deadline. A timeout becomes [`VaultError::TransientIo`];
    /// transient failures are retried immediately, anything else returns at once.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> VaultResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = VaultResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let err = match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if !e.is_transient() => return Err(e),
                Ok(Err(e)) => e,
                Err(_elapsed) => VaultError::TransientIo(format!(
                    "{what} timed out after {}ms",
                    self.timeout.as_millis()
                )),
            };

            if attempt >= self.max_retries {
                tracing::warn!(op = what, attempts = attempt + 1, error = %err, "giving up");
                return Err(err);
            }
            attempt += 1;
            tracing::debug!(op = what, attempt, error = %err, "retrying after transient failure");
        }
    }
}
