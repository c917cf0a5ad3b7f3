use std::sync::Arc;
use std::time::Duration;

use log::warn;

use crate::client::{CoordinationClient, LockHandle};
use crate::error::CoordError;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Scoped acquisition of the coordination service's lock primitive.
///
/// Locks are only taken for read-then-write reconciliation sequences; the
/// common claim path relies on `create_node` atomicity alone. Reentrant
/// acquisition by the same identity is not guaranteed.
pub struct LockManager {
    client: Arc<dyn CoordinationClient>,
    timeout: Duration,
}

impl LockManager {
    pub fn new(client: Arc<dyn CoordinationClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn with_default_timeout(client: Arc<dyn CoordinationClient>) -> Self {
        Self::new(client, DEFAULT_LOCK_TIMEOUT)
    }

    /// Block until the lock at `path` is held, up to the configured timeout.
    /// A `LockTimeout` is transient; callers retry the whole operation.
    pub async fn acquire(&self, path: &str, identity: &str) -> Result<LockGuard, CoordError> {
        let handle = self.client.acquire_lock(path, identity, self.timeout).await?;
        Ok(LockGuard {
            client: Arc::clone(&self.client),
            handle: Some(handle),
        })
    }
}

/// Held lock. Release happens on [`LockGuard::release`] or, failing that,
/// best-effort when the guard drops.
pub struct LockGuard {
    client: Arc<dyn CoordinationClient>,
    handle: Option<LockHandle>,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl LockGuard {
    pub fn path(&self) -> &str {
        self.handle.as_ref().map(|h| h.path()).unwrap_or_default()
    }

    pub async fn release(mut self) -> Result<(), CoordError> {
        match self.handle.take() {
            Some(handle) => self.client.release_lock(handle).await,
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let path = handle.path().to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let client = Arc::clone(&self.client);
                rt.spawn(async move {
                    if let Err(e) = client.release_lock(handle).await {
                        warn!("failed to release dropped lock on {path}: {e}");
                    }
                });
            }
            Err(_) => {
                warn!("lock on {path} dropped outside a runtime; waiting on lease expiry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryClient;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let client: Arc<dyn CoordinationClient> = Arc::new(MemoryClient::new());
        let manager = LockManager::new(Arc::clone(&client), Duration::from_millis(100));

        let guard = manager.acquire("/locks/x", "lr-1").await.unwrap();
        assert_eq!(guard.path(), "/locks/x");

        // still held, so a second acquire times out
        let err = manager.acquire("/locks/x", "lr-2").await.unwrap_err();
        assert!(matches!(err, CoordError::LockTimeout { .. }));

        guard.release().await.unwrap();
        let guard = manager.acquire("/locks/x", "lr-2").await.unwrap();
        guard.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_releases_in_background() {
        let client: Arc<dyn CoordinationClient> = Arc::new(MemoryClient::new());
        let manager = LockManager::new(Arc::clone(&client), Duration::from_millis(200));

        {
            let _guard = manager.acquire("/locks/y", "lr-1").await.unwrap();
        }
        // the spawned release runs on this runtime; poll until it lands
        let mut reacquired = None;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if let Ok(g) = manager.acquire("/locks/y", "lr-2").await {
                reacquired = Some(g);
                break;
            }
        }
        let guard = reacquired.expect("dropped lock was never released");
        guard.release().await.unwrap();
    }
}
