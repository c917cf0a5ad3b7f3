use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordError {
    #[error("node already exists: {path}")]
    AlreadyExists { path: String },

    #[error("node not found: {path}")]
    NotFound { path: String },

    #[error("timed out contending for {path}")]
    LockTimeout { path: String },

    #[error("coordination service unavailable: {0}")]
    Unavailable(#[source] Box<etcd_client::Error>),
}

impl From<etcd_client::Error> for CoordError {
    fn from(e: etcd_client::Error) -> Self {
        CoordError::Unavailable(Box::new(e))
    }
}

impl CoordError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, CoordError::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoordError::NotFound { .. })
    }
}
