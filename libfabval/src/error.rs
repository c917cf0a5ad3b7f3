use libcoord::CoordError;
use thiserror::Error;

/// Error taxonomy surfaced to resource handlers. Conflicts carry the fresh
/// owner for diagnostics; lock timeouts are transient and the whole
/// operation may be retried.
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("scope {scope} is already owned by {owner}")]
    Conflict { scope: String, owner: String },

    #[error("timed out contending for {path}; the operation may be retried")]
    LockTimeout { path: String },

    #[error("id {id} in namespace {namespace} is already reserved by {owner}")]
    AlreadyReserved {
        namespace: String,
        id: u64,
        owner: String,
    },

    #[error("id {id} is outside the configured range of namespace {namespace}")]
    OutOfRange { namespace: String, id: u64 },

    #[error("no free ids left in namespace {namespace}")]
    Exhausted { namespace: String },

    #[error(transparent)]
    Encoding(#[from] serde_json::Error),

    #[error("coordination service unavailable")]
    Unavailable(#[source] CoordError),
}

impl From<CoordError> for FabricError {
    fn from(e: CoordError) -> Self {
        match e {
            CoordError::NotFound { path } => FabricError::NotFound(path),
            CoordError::LockTimeout { path } => FabricError::LockTimeout { path },
            other => FabricError::Unavailable(other),
        }
    }
}

impl FabricError {
    /// Transient errors are safe to retry wholesale; everything else is a
    /// terminal validation result for this request.
    pub fn is_transient(&self) -> bool {
        matches!(self, FabricError::LockTimeout { .. })
    }
}
