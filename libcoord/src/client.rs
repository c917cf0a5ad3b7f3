use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use crate::error::CoordError;

/// Hierarchical node store with atomic create-if-absent and a distributed
/// lock primitive. Backed by etcd/Xline in production ([`crate::XlineClient`])
/// and by an in-process map in tests ([`crate::MemoryClient`]).
///
/// Node values are opaque bytes; callers layer their own encoding on top.
/// `create_node` failing with [`CoordError::AlreadyExists`] is the only
/// atomicity guarantee consumers may rely on for first-writer-wins.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Create `path` with `value`. Fails with `AlreadyExists` when the path
    /// is already present, regardless of its value.
    async fn create_node(&self, path: &str, value: &[u8]) -> Result<(), CoordError>;

    /// Read the value stored at `path`. Fails with `NotFound` when absent.
    async fn read_node(&self, path: &str) -> Result<Vec<u8>, CoordError>;

    /// Overwrite the value at an existing `path`. Fails with `NotFound`
    /// when the path is absent; never creates it.
    async fn update_node(&self, path: &str, value: &[u8]) -> Result<(), CoordError>;

    /// Delete `path`, and its children when `recursive`. Deleting an absent
    /// path is not an error.
    async fn delete_node(&self, path: &str, recursive: bool) -> Result<(), CoordError>;

    /// Block until the lock at `path` is held or `timeout` elapses, in
    /// which case `LockTimeout` is returned. `owner` is recorded for
    /// diagnostics only.
    async fn acquire_lock(
        &self,
        path: &str,
        owner: &str,
        timeout: Duration,
    ) -> Result<LockHandle, CoordError>;

    /// Release a lock previously returned by `acquire_lock`.
    async fn release_lock(&self, handle: LockHandle) -> Result<(), CoordError>;
}

/// Proof of lock ownership, released through the client that issued it.
/// Prefer [`crate::LockManager::acquire`], whose guard releases on scope
/// exit, over holding a raw handle.
pub struct LockHandle {
    pub(crate) path: String,
    pub(crate) owner: String,
    pub(crate) token: LockToken,
}

pub(crate) enum LockToken {
    /// Ownership key and lease id from the etcd lock RPC.
    Xline { key: Vec<u8>, lease: i64 },
    /// Guard over the in-process per-path mutex.
    Memory { guard: OwnedMutexGuard<()> },
}

impl LockHandle {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("path", &self.path)
            .field("owner", &self.owner)
            .finish()
    }
}
