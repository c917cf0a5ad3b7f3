use std::sync::Arc;

use async_trait::async_trait;
use libcoord::{CoordError, CoordinationClient, LockManager};
use log::{error, info, warn};

use crate::config::ValidationConfig;
use crate::context::{TransactionContext, UndoAction};
use crate::error::FabricError;
use crate::scope::{FabricStyle, ResourceKey};

/// Bounded retries when a validation node flickers between a losing create
/// and the follow-up read (concurrent release).
const RACE_RETRIES: usize = 10;

/// Freshness queries against the primary configuration datastore.
///
/// Non-existence is a normal answer (`Ok(false)` / `Ok(None)`); errors mean
/// the query itself could not be answered and abort the claim.
#[async_trait]
pub trait SystemOfRecord: Send + Sync {
    /// Whether `identity` still exists in the datastore.
    async fn resolve(&self, identity: &str) -> Result<bool, FabricError>;

    /// The identity holding a back-reference to `scope`, if any.
    async fn find_owner_back_ref(
        &self,
        scope: &ResourceKey,
    ) -> Result<Option<String>, FabricError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// First writer; the scope is now owned by the requester.
    Claimed,
    /// The requester already held the scope; nothing changed.
    AlreadyOwnedByRequester,
    /// Appended to the owner list of a shared-capable scope.
    SharedJoined,
    /// A stale owner was replaced by the requester under the reclaim lock.
    ReclaimedFromStale,
}

impl ClaimOutcome {
    /// How much a node contributed to the aggregate claim; higher wins.
    fn rank(self) -> u8 {
        match self {
            ClaimOutcome::AlreadyOwnedByRequester => 0,
            ClaimOutcome::SharedJoined => 1,
            ClaimOutcome::Claimed => 2,
            ClaimOutcome::ReclaimedFromStale => 3,
        }
    }
}

/// Result of a successful claim. `paths` is the full node set belonging to
/// the claim and must be released as a unit; `obsolete_paths` are nodes of
/// a superseded claim the caller deletes only after its own datastore write
/// commits.
#[derive(Debug, Clone)]
pub struct Claim {
    pub outcome: ClaimOutcome,
    pub paths: Vec<String>,
    pub obsolete_paths: Vec<String>,
}

/// Cluster-wide uniqueness claims over coordination-service nodes.
///
/// The fast path is a bare `create_node`: first writer wins, no lock. Only
/// reclaiming a stale claim takes the distributed lock, because that
/// read-then-write cannot race a concurrent reconciler.
pub struct UniquenessValidator {
    client: Arc<dyn CoordinationClient>,
    record: Arc<dyn SystemOfRecord>,
    locks: LockManager,
    config: ValidationConfig,
}

impl UniquenessValidator {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        record: Arc<dyn SystemOfRecord>,
        config: ValidationConfig,
    ) -> Self {
        let locks = LockManager::new(Arc::clone(&client), config.lock_timeout());
        Self {
            client,
            record,
            locks,
            config,
        }
    }

    /// Claim `key` for `requester`. See [`Claim`] for what comes back;
    /// fresh foreign owners surface as [`FabricError::Conflict`], owners
    /// gone from the datastore are reclaimed in place.
    pub async fn claim_unique(
        &self,
        style: FabricStyle,
        key: &ResourceKey,
        requester: &str,
        shared_allowed: bool,
        ctx: &mut TransactionContext,
    ) -> Result<Claim, FabricError> {
        self.claim_unique_superseding(style, key, None, requester, shared_allowed, ctx)
            .await
    }

    /// Like [`Self::claim_unique`], additionally marking the nodes of
    /// `previous` obsolete (a tagged/untagged flip or vlan retag moves the
    /// claim to a different key). The obsolete nodes are returned, not
    /// deleted: they must outlive the caller's datastore commit.
    pub async fn claim_unique_superseding(
        &self,
        style: FabricStyle,
        key: &ResourceKey,
        previous: Option<&ResourceKey>,
        requester: &str,
        shared_allowed: bool,
        ctx: &mut TransactionContext,
    ) -> Result<Claim, FabricError> {
        let nodes = self.claim_nodes(style, key);
        let mut aggregate: Option<ClaimOutcome> = None;
        for (path, node_key) in &nodes {
            let outcome = self
                .claim_node(path, node_key, requester, shared_allowed, ctx)
                .await?;
            aggregate = Some(match aggregate {
                Some(prev) if prev.rank() >= outcome.rank() => prev,
                _ => outcome,
            });
        }
        let paths: Vec<String> = nodes.into_iter().map(|(path, _)| path).collect();
        let outcome = aggregate.unwrap_or(ClaimOutcome::AlreadyOwnedByRequester);

        let obsolete_paths = match previous {
            Some(prev) if prev != key => self.claim_paths(style, prev),
            _ => Vec::new(),
        };
        if !obsolete_paths.is_empty() {
            info!(
                "claim for {requester} moved off {} node(s); caller deletes them after commit",
                obsolete_paths.len()
            );
        }

        Ok(Claim {
            outcome,
            paths,
            obsolete_paths,
        })
    }

    /// Delete every node of one logical claim. Deletes are idempotent and
    /// all paths are attempted even when one fails, so a retry of the whole
    /// set converges; the first failure is reported. Deletes are exact:
    /// a layered parent node may still shelter other claims' children.
    pub async fn release_claim(&self, paths: &[String]) -> Result<(), FabricError> {
        let mut first_err = None;
        for path in paths {
            if let Err(e) = self.client.delete_node(path, false).await {
                error!("failed to delete validation node {path}: {e}");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Node paths making up one logical claim, parent first, each with the
    /// sub-key that scopes its freshness checks.
    fn claim_nodes(&self, style: FabricStyle, key: &ResourceKey) -> Vec<(String, ResourceKey)> {
        let prefix = self.config.style_prefix(style);
        match style {
            FabricStyle::Enterprise => key
                .layered_paths(&prefix)
                .into_iter()
                .zip(key.prefix_keys())
                .collect(),
            FabricStyle::ServiceProvider | FabricStyle::LogicalRouter => {
                vec![(key.node_path(&prefix), key.clone())]
            }
        }
    }

    fn claim_paths(&self, style: FabricStyle, key: &ResourceKey) -> Vec<String> {
        self.claim_nodes(style, key)
            .into_iter()
            .map(|(path, _)| path)
            .collect()
    }

    fn lock_path(&self, node_path: &str) -> String {
        match node_path.strip_prefix(self.config.path_prefix.as_str()) {
            Some(rest) => format!("{}{}", self.config.lock_prefix, rest),
            None => format!("{}{}", self.config.lock_prefix, node_path),
        }
    }

    /// One node of a claim. The bare `create_node` settles the common
    /// race; everything after handles an existing node.
    async fn claim_node(
        &self,
        path: &str,
        key: &ResourceKey,
        requester: &str,
        shared_allowed: bool,
        ctx: &mut TransactionContext,
    ) -> Result<ClaimOutcome, FabricError> {
        let mut existing: Option<Vec<u8>> = None;
        for _ in 0..RACE_RETRIES {
            match self.client.create_node(path, requester.as_bytes()).await {
                Ok(()) => {
                    ctx.push_undo(UndoAction::DeleteNode {
                        path: path.to_string(),
                        recursive: false,
                    });
                    return Ok(ClaimOutcome::Claimed);
                }
                Err(CoordError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            match self.client.read_node(path).await {
                Ok(v) => {
                    existing = Some(v);
                    break;
                }
                // released between the losing create and the read; try again
                Err(CoordError::NotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let Some(raw) = existing else {
            return Err(FabricError::LockTimeout {
                path: path.to_string(),
            });
        };

        let owners = parse_owners(&raw);
        if owners.iter().any(|o| o == requester) {
            return Ok(ClaimOutcome::AlreadyOwnedByRequester);
        }

        if shared_allowed {
            let mut joined = owners;
            joined.push(requester.to_string());
            let encoded = encode_owners(&joined)?;
            self.client.update_node(path, &encoded).await?;
            ctx.push_undo(UndoAction::WriteNode {
                path: path.to_string(),
                value: raw,
            });
            return Ok(ClaimOutcome::SharedJoined);
        }

        // a non-shared node holds a single identity
        let holder = owners.into_iter().next_back().unwrap_or_default();
        if self.holder_is_fresh(&holder, key).await? {
            return Err(FabricError::Conflict {
                scope: path.to_string(),
                owner: holder,
            });
        }
        self.reclaim_stale(path, &raw, &holder, requester, ctx).await
    }

    /// Owner exists and still references the scope in the datastore.
    async fn holder_is_fresh(
        &self,
        holder: &str,
        key: &ResourceKey,
    ) -> Result<bool, FabricError> {
        if holder.is_empty() {
            return Ok(false);
        }
        if !self.record.resolve(holder).await? {
            return Ok(false);
        }
        match self.record.find_owner_back_ref(key).await? {
            Some(owner) => Ok(owner == holder),
            None => Ok(false),
        }
    }

    /// Replace a stale owner under the reclaim lock. The node is re-read
    /// while the lock is held; a value that moved meanwhile means another
    /// reconciler won and the new owner is reported as the conflict.
    async fn reclaim_stale(
        &self,
        path: &str,
        seen: &[u8],
        holder: &str,
        requester: &str,
        ctx: &mut TransactionContext,
    ) -> Result<ClaimOutcome, FabricError> {
        let lock_path = self.lock_path(path);
        let guard = self.locks.acquire(&lock_path, requester).await?;

        let result = self
            .reclaim_under_lock(path, seen, holder, requester, ctx)
            .await;

        if let Err(e) = guard.release().await {
            warn!("failed to release reclaim lock on {lock_path}: {e}");
        }
        result
    }

    async fn reclaim_under_lock(
        &self,
        path: &str,
        seen: &[u8],
        holder: &str,
        requester: &str,
        ctx: &mut TransactionContext,
    ) -> Result<ClaimOutcome, FabricError> {
        let current = match self.client.read_node(path).await {
            Ok(v) => v,
            Err(CoordError::NotFound { .. }) => {
                // the stale owner's release finally landed
                self.client.create_node(path, requester.as_bytes()).await?;
                ctx.push_undo(UndoAction::DeleteNode {
                    path: path.to_string(),
                    recursive: false,
                });
                return Ok(ClaimOutcome::Claimed);
            }
            Err(e) => return Err(e.into()),
        };

        if current != seen {
            let owners = parse_owners(&current);
            if owners.iter().any(|o| o == requester) {
                return Ok(ClaimOutcome::AlreadyOwnedByRequester);
            }
            let winner = owners.into_iter().next_back().unwrap_or_default();
            return Err(FabricError::Conflict {
                scope: path.to_string(),
                owner: winner,
            });
        }

        self.client.update_node(path, requester.as_bytes()).await?;
        ctx.push_undo(UndoAction::WriteNode {
            path: path.to_string(),
            value: current,
        });
        info!("reclaimed stale validation node {path} from {holder} for {requester}");
        Ok(ClaimOutcome::ReclaimedFromStale)
    }
}

/// A node value is either a raw identity string or a JSON string array for
/// shared-capable scopes. Both forms stay parseable regardless of which
/// writer produced them.
fn parse_owners(raw: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(raw);
    if let Ok(list) = serde_json::from_str::<Vec<String>>(&text) {
        return list;
    }
    if text.is_empty() {
        Vec::new()
    } else {
        vec![text.into_owned()]
    }
}

fn encode_owners(owners: &[String]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(owners)
}
