mod container;
mod queue;
mod replenish;

pub use container::{CheckedOutContainer, ContainerId, ContainerState, Endpoint, IdleContainer, Purpose};
pub use queue::{ContainerPool, PoolSnapshot, PoolStats};
pub use replenish::{ReplenishHandle, Replenisher};

use async_trait::async_trait;
use thiserror::Error;

use crate::mounts::MountError;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Mount error: {0}")]
    Mount(#[from] MountError),

    #[error("Failed to provision container: {0}")]
    Provision(String),

    #[error("Container {0} has no reachable address")]
    NoAddress(ContainerId),

    #[error("Failed to destroy container {id}: {reason}")]
    Destroy { id: ContainerId, reason: String },
}

/// Creates and tears down sandboxes. Both calls are slow and are never made
/// while the pool lock is held.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self) -> Result<IdleContainer, PoolError>;

    async fn destroy(&self, id: ContainerId) -> Result<(), PoolError>;
}
