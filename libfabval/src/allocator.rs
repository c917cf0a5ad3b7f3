use std::collections::HashMap;
use std::sync::Arc;

use libcoord::{CoordError, CoordinationClient};
use log::warn;

use crate::context::{TransactionContext, UndoAction};
use crate::error::FabricError;

pub const VXLAN_NAMESPACE: &str = "vxlan";
/// 24-bit VNI space; 0 is reserved by the dataplane.
pub const VXLAN_ID_RANGE: IdRange = IdRange {
    start: 1,
    size: (1 << 24) - 1,
};

pub const VPG_ID_NAMESPACE: &str = "virtual-port-group-id";
pub const VPG_ID_RANGE: IdRange = IdRange {
    start: 0,
    size: 1 << 16,
};

/// Bounded retries when a reservation node flickers between a losing
/// create and the follow-up read (concurrent free).
const RACE_RETRIES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub start: u64,
    pub size: u64,
}

impl IdRange {
    /// First id past the range.
    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    pub fn contains(&self, id: u64) -> bool {
        id >= self.start && id < self.end()
    }

    /// Next id after `id`, wrapping back to the range start.
    fn next_after(&self, id: u64) -> u64 {
        let next = id + 1;
        if next >= self.end() { self.start } else { next }
    }
}

enum ReserveOutcome {
    Reserved,
    Held(String),
    /// The node vanished between the losing create and the read.
    Released,
}

/// Allocates small integer ids within a namespace, keyed by an owner name.
///
/// The id node is reserved with atomic create-if-absent, so the common path
/// takes no lock; a name node next to it serves forward lookups. Scanning
/// for a free id resumes after the namespace's last allocation and wraps
/// around the range.
pub struct IdentifierAllocator {
    client: Arc<dyn CoordinationClient>,
    prefix: String,
    namespaces: HashMap<String, IdRange>,
}

impl IdentifierAllocator {
    pub fn new(client: Arc<dyn CoordinationClient>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            namespaces: HashMap::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>, range: IdRange) -> Self {
        self.namespaces.insert(namespace.into(), range);
        self
    }

    /// Allocator with the controller's standard namespaces registered.
    pub fn with_standard_namespaces(client: Arc<dyn CoordinationClient>, prefix: impl Into<String>) -> Self {
        Self::new(client, prefix)
            .with_namespace(VXLAN_NAMESPACE, VXLAN_ID_RANGE)
            .with_namespace(VPG_ID_NAMESPACE, VPG_ID_RANGE)
    }

    fn range(&self, namespace: &str) -> Result<IdRange, FabricError> {
        self.namespaces
            .get(namespace)
            .copied()
            .ok_or_else(|| FabricError::NotFound(format!("id namespace {namespace}")))
    }

    fn id_node(&self, namespace: &str, id: u64) -> String {
        format!("{}/{}/id/{}", self.prefix, namespace, id)
    }

    fn name_node(&self, namespace: &str, name: &str) -> String {
        format!("{}/{}/name/{}", self.prefix, namespace, name)
    }

    fn hint_node(&self, namespace: &str) -> String {
        format!("{}/{}/last-allocated", self.prefix, namespace)
    }

    /// Reserve an id for `name`. With `requested` set, only that exact id
    /// is attempted and a foreign reservation fails with `AlreadyReserved`;
    /// re-requesting an id the name already holds succeeds unchanged.
    /// Without it, the next free id in the namespace's range is taken.
    pub async fn allocate(
        &self,
        namespace: &str,
        name: &str,
        requested: Option<u64>,
        ctx: &mut TransactionContext,
    ) -> Result<u64, FabricError> {
        let range = self.range(namespace)?;
        match requested {
            Some(id) => {
                if !range.contains(id) {
                    return Err(FabricError::OutOfRange {
                        namespace: namespace.to_string(),
                        id,
                    });
                }
                self.allocate_exact(namespace, name, id, ctx).await
            }
            None => self.allocate_next_free(namespace, name, range, ctx).await,
        }
    }

    async fn allocate_exact(
        &self,
        namespace: &str,
        name: &str,
        id: u64,
        ctx: &mut TransactionContext,
    ) -> Result<u64, FabricError> {
        for _ in 0..RACE_RETRIES {
            match self.try_reserve(namespace, id, name).await? {
                ReserveOutcome::Reserved => {
                    self.finish_reservation(namespace, name, id, ctx).await?;
                    return Ok(id);
                }
                ReserveOutcome::Held(owner) if owner == name => return Ok(id),
                ReserveOutcome::Held(owner) => {
                    return Err(FabricError::AlreadyReserved {
                        namespace: namespace.to_string(),
                        id,
                        owner,
                    });
                }
                ReserveOutcome::Released => continue,
            }
        }
        Err(FabricError::LockTimeout {
            path: self.id_node(namespace, id),
        })
    }

    async fn allocate_next_free(
        &self,
        namespace: &str,
        name: &str,
        range: IdRange,
        ctx: &mut TransactionContext,
    ) -> Result<u64, FabricError> {
        let start = match self.read_hint(namespace).await {
            Some(hint) if range.contains(hint) => range.next_after(hint),
            _ => range.start,
        };

        let mut id = start;
        loop {
            match self.try_reserve(namespace, id, name).await? {
                ReserveOutcome::Reserved => {
                    self.finish_reservation(namespace, name, id, ctx).await?;
                    return Ok(id);
                }
                // held or flickering, either way move on
                ReserveOutcome::Held(_) | ReserveOutcome::Released => {}
            }
            id = range.next_after(id);
            if id == start {
                return Err(FabricError::Exhausted {
                    namespace: namespace.to_string(),
                });
            }
        }
    }

    async fn try_reserve(
        &self,
        namespace: &str,
        id: u64,
        name: &str,
    ) -> Result<ReserveOutcome, FabricError> {
        let node = self.id_node(namespace, id);
        match self.client.create_node(&node, name.as_bytes()).await {
            Ok(()) => Ok(ReserveOutcome::Reserved),
            Err(CoordError::AlreadyExists { .. }) => {
                match self.client.read_node(&node).await {
                    Ok(v) => Ok(ReserveOutcome::Held(
                        String::from_utf8_lossy(&v).into_owned(),
                    )),
                    Err(CoordError::NotFound { .. }) => Ok(ReserveOutcome::Released),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record the name node and hint after the id node was won, and push
    /// the compensating deletes.
    async fn finish_reservation(
        &self,
        namespace: &str,
        name: &str,
        id: u64,
        ctx: &mut TransactionContext,
    ) -> Result<(), FabricError> {
        ctx.push_undo(UndoAction::DeleteNode {
            path: self.id_node(namespace, id),
            recursive: false,
        });

        let name_node = self.name_node(namespace, name);
        let value = id.to_string();
        match self.client.create_node(&name_node, value.as_bytes()).await {
            Ok(()) => ctx.push_undo(UndoAction::DeleteNode {
                path: name_node,
                recursive: false,
            }),
            Err(CoordError::AlreadyExists { .. }) => {
                // the name moved to a new id; keep the old value for rollback
                let prior = self.client.read_node(&name_node).await?;
                self.client.update_node(&name_node, value.as_bytes()).await?;
                ctx.push_undo(UndoAction::WriteNode {
                    path: name_node,
                    value: prior,
                });
            }
            Err(e) => return Err(e.into()),
        }

        self.write_hint(namespace, id).await;
        Ok(())
    }

    async fn read_hint(&self, namespace: &str) -> Option<u64> {
        let node = self.hint_node(namespace);
        let raw = self.client.read_node(&node).await.ok()?;
        String::from_utf8_lossy(&raw).parse().ok()
    }

    /// Best effort; a lost hint only costs scan time.
    async fn write_hint(&self, namespace: &str, id: u64) {
        let node = self.hint_node(namespace);
        let value = id.to_string();
        let res = match self.client.update_node(&node, value.as_bytes()).await {
            Err(CoordError::NotFound { .. }) => {
                match self.client.create_node(&node, value.as_bytes()).await {
                    Err(CoordError::AlreadyExists { .. }) => {
                        self.client.update_node(&node, value.as_bytes()).await
                    }
                    other => other,
                }
            }
            other => other,
        };
        if let Err(e) = res {
            warn!("failed to record allocation hint for {namespace}: {e}");
        }
    }

    /// Release `id` back to the namespace. Absent reservations are a no-op;
    /// a reservation held by a different name is left alone.
    pub async fn free(
        &self,
        namespace: &str,
        id: u64,
        name: &str,
        ctx: &mut TransactionContext,
    ) -> Result<(), FabricError> {
        let node = self.id_node(namespace, id);
        let owner = match self.client.read_node(&node).await {
            Ok(v) => String::from_utf8_lossy(&v).into_owned(),
            Err(CoordError::NotFound { .. }) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if owner != name {
            warn!(
                "refusing to free id {id} in namespace {namespace}: reserved by {owner}, not {name}"
            );
            return Ok(());
        }

        self.client.delete_node(&node, false).await?;
        ctx.push_undo(UndoAction::WriteNode {
            path: node,
            value: name.as_bytes().to_vec(),
        });

        let name_node = self.name_node(namespace, name);
        match self.client.read_node(&name_node).await {
            Ok(v) if v == id.to_string().as_bytes() => {
                self.client.delete_node(&name_node, false).await?;
                ctx.push_undo(UndoAction::WriteNode {
                    path: name_node,
                    value: v,
                });
            }
            // the name points at some other id now, or is already gone
            Ok(_) | Err(CoordError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Name currently holding `id`, if any.
    pub async fn lookup_owner(
        &self,
        namespace: &str,
        id: u64,
    ) -> Result<Option<String>, FabricError> {
        match self.client.read_node(&self.id_node(namespace, id)).await {
            Ok(v) => Ok(Some(String::from_utf8_lossy(&v).into_owned())),
            Err(CoordError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Id currently reserved for `name`, if any.
    pub async fn lookup_id(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<u64>, FabricError> {
        match self.client.read_node(&self.name_node(namespace, name)).await {
            Ok(v) => Ok(String::from_utf8_lossy(&v).parse().ok()),
            Err(CoordError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
