//! Distributed resource allocation and uniqueness validation for the fabric
//! config controller.
//!
//! API-server processes racing on the same resources coordinate through a
//! shared etcd/Xline cluster: small-integer identifiers (VXLAN network ids,
//! virtual-port-group ids) are reserved with atomic create-if-absent, and
//! cluster-wide uniqueness claims ("this VLAN on this port group binds one
//! virtual network") are validation nodes owned by a requester identity.
//! A claim whose owner has disappeared from the primary datastore is stale
//! and gets reclaimed in place, so crashed writers self-heal without a
//! garbage-collection pass. Every mutation records a compensating action in
//! the per-request [`TransactionContext`], unwound in reverse on failure.

mod allocator;
mod config;
mod context;
mod error;
mod scope;
mod validator;

pub use allocator::IdRange;
pub use allocator::IdentifierAllocator;
pub use allocator::VPG_ID_NAMESPACE;
pub use allocator::VPG_ID_RANGE;
pub use allocator::VXLAN_ID_RANGE;
pub use allocator::VXLAN_NAMESPACE;
pub use config::DEFAULT_ID_ALLOC_PREFIX;
pub use config::DEFAULT_LOCK_TIMEOUT_SECS;
pub use config::DEFAULT_VALIDATION_LOCK_PREFIX;
pub use config::DEFAULT_VALIDATION_PATH_PREFIX;
pub use config::ValidationConfig;
pub use config::load_validation_config;
pub use context::TransactionContext;
pub use context::UndoAction;
pub use context::with_transaction;
pub use error::FabricError;
pub use scope::FabricStyle;
pub use scope::ResourceKey;
pub use scope::ScopeKind;
pub use scope::ScopeSegment;
pub use validator::Claim;
pub use validator::ClaimOutcome;
pub use validator::SystemOfRecord;
pub use validator::UniquenessValidator;
