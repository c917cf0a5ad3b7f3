//! Client layer for the coordination service (etcd/Xline) used by the
//! fabric validation subsystem: hierarchical nodes with atomic
//! create-if-absent, plus distributed locks.

mod client;
mod config;
mod error;
mod lock;
mod memory;
mod xline;

pub use client::CoordinationClient;
pub use client::LockHandle;
pub use config::CoordConfig;
pub use config::load_coord_config;
pub use error::CoordError;
pub use lock::DEFAULT_LOCK_TIMEOUT;
pub use lock::LockGuard;
pub use lock::LockManager;
pub use memory::MemoryClient;
pub use xline::XlineClient;
