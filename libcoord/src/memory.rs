use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use tokio::sync::Mutex;

use crate::client::{CoordinationClient, LockHandle, LockToken};
use crate::error::CoordError;

/// In-process coordination client with the same observable semantics as
/// [`crate::XlineClient`]. Used by the test suites and for single-process
/// development setups.
#[derive(Default)]
pub struct MemoryClient {
    nodes: Mutex<BTreeMap<String, Vec<u8>>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored node, for assertions in tests.
    pub async fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.nodes.lock().await.clone()
    }
}

#[async_trait]
impl CoordinationClient for MemoryClient {
    async fn create_node(&self, path: &str, value: &[u8]) -> Result<(), CoordError> {
        let mut nodes = self.nodes.lock().await;
        if nodes.contains_key(path) {
            return Err(CoordError::AlreadyExists {
                path: path.to_string(),
            });
        }
        nodes.insert(path.to_string(), value.to_vec());
        Ok(())
    }

    async fn read_node(&self, path: &str) -> Result<Vec<u8>, CoordError> {
        self.nodes
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| CoordError::NotFound {
                path: path.to_string(),
            })
    }

    async fn update_node(&self, path: &str, value: &[u8]) -> Result<(), CoordError> {
        let mut nodes = self.nodes.lock().await;
        match nodes.get_mut(path) {
            Some(stored) => {
                *stored = value.to_vec();
                Ok(())
            }
            None => Err(CoordError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    async fn delete_node(&self, path: &str, recursive: bool) -> Result<(), CoordError> {
        let mut nodes = self.nodes.lock().await;
        nodes.remove(path);
        if recursive {
            let prefix = format!("{path}/");
            nodes.retain(|k, _| !k.starts_with(&prefix));
        }
        Ok(())
    }

    async fn acquire_lock(
        &self,
        path: &str,
        owner: &str,
        timeout: Duration,
    ) -> Result<LockHandle, CoordError> {
        let mutex = {
            let mut locks = self.locks.lock().await;
            Arc::clone(
                locks
                    .entry(path.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(LockHandle {
                path: path.to_string(),
                owner: owner.to_string(),
                token: LockToken::Memory { guard },
            }),
            Err(_) => Err(CoordError::LockTimeout {
                path: path.to_string(),
            }),
        }
    }

    async fn release_lock(&self, handle: LockHandle) -> Result<(), CoordError> {
        match handle.token {
            LockToken::Memory { guard } => {
                drop(guard);
                Ok(())
            }
            LockToken::Xline { .. } => {
                warn!(
                    "xline lock handle for {} released through the in-process client",
                    handle.path
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_is_first_writer_wins() {
        let client = MemoryClient::new();
        client.create_node("/a/b", b"one").await.unwrap();
        let err = client.create_node("/a/b", b"two").await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(client.read_node("/a/b").await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_update_requires_existing_node() {
        let client = MemoryClient::new();
        assert!(client.update_node("/a", b"x").await.unwrap_err().is_not_found());
        client.create_node("/a", b"x").await.unwrap();
        client.update_node("/a", b"y").await.unwrap();
        assert_eq!(client.read_node("/a").await.unwrap(), b"y");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_recursive() {
        let client = MemoryClient::new();
        client.create_node("/root/x", b"1").await.unwrap();
        client.create_node("/root/x/child", b"2").await.unwrap();
        client.create_node("/root/xy", b"3").await.unwrap();

        client.delete_node("/root/x", true).await.unwrap();
        assert!(client.read_node("/root/x").await.unwrap_err().is_not_found());
        assert!(
            client
                .read_node("/root/x/child")
                .await
                .unwrap_err()
                .is_not_found()
        );
        // sibling sharing the string prefix survives
        assert_eq!(client.read_node("/root/xy").await.unwrap(), b"3");

        // absent path is fine
        client.delete_node("/root/x", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_times_out_while_held() {
        let client = MemoryClient::new();
        let held = client
            .acquire_lock("/locks/a", "holder", Duration::from_secs(1))
            .await
            .unwrap();

        let err = client
            .acquire_lock("/locks/a", "waiter", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordError::LockTimeout { .. }));

        client.release_lock(held).await.unwrap();
        let again = client
            .acquire_lock("/locks/a", "waiter", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(again.owner(), "waiter");
        client.release_lock(again).await.unwrap();
    }

    #[tokio::test]
    async fn test_locks_on_different_paths_are_independent() {
        let client = MemoryClient::new();
        let a = client
            .acquire_lock("/locks/a", "h", Duration::from_secs(1))
            .await
            .unwrap();
        let b = client
            .acquire_lock("/locks/b", "h", Duration::from_secs(1))
            .await
            .unwrap();
        client.release_lock(a).await.unwrap();
        client.release_lock(b).await.unwrap();
    }
}
