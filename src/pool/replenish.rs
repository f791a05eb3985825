use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::{CheckedOutContainer, ContainerId, ContainerPool, PoolError};

/// Restores pool depth after a container has been consumed.
#[derive(Clone)]
pub struct Replenisher {
    pool: Arc<ContainerPool>,
}

impl Replenisher {
    pub fn new(pool: Arc<ContainerPool>) -> Self {
        Self { pool }
    }

    /// Destroys `container` and provisions exactly one replacement.
    ///
    /// A failed teardown is logged and does not prevent the replacement. A
    /// failed replacement is returned; the next pool fill makes up the depth.
    pub async fn kill_and_create(&self, container: CheckedOutContainer) -> Result<ContainerId, PoolError> {
        let old_id = container.id();

        if let Err(e) = self.pool.destroy(container).await {
            error!("Failed to destroy container {}: {}", old_id, e);
        }

        let new_id = self.pool.provision_replacement().await?;
        info!("Replaced container {} with {}", old_id, new_id);
        Ok(new_id)
    }

    /// Starts `workers` tasks consuming the replenishment queue and returns
    /// the handle used to submit work to it.
    pub fn spawn(self, workers: usize) -> ReplenishHandle {
        let (sender, receiver) = mpsc::unbounded_channel::<CheckedOutContainer>();
        let receiver = Arc::new(Mutex::new(receiver));

        for worker in 0..workers.max(1) {
            let receiver = receiver.clone();
            let replenisher = self.clone();
            tokio::spawn(async move {
                replenisher.worker_loop(worker, receiver).await;
            });
        }

        info!("Replenisher started with {} worker(s)", workers.max(1));
        ReplenishHandle { sender }
    }

    async fn worker_loop(
        &self,
        worker: usize,
        receiver: Arc<Mutex<mpsc::UnboundedReceiver<CheckedOutContainer>>>,
    ) {
        loop {
            // Hold the receiver lock only while waiting for the next job
            let job = receiver.lock().await.recv().await;
            let Some(container) = job else {
                debug!("Replenish worker {} stopping: queue closed", worker);
                break;
            };

            let id = container.id();
            debug!("Replenish worker {} picked up container {}", worker, id);
            if let Err(e) = self.kill_and_create(container).await {
                warn!(
                    "Replacement for container {} failed, pool fill will retry: {}",
                    id, e
                );
            }
        }
    }
}

/// Submits consumed containers for destruction and replacement without
/// waiting for either.
#[derive(Clone, Debug)]
pub struct ReplenishHandle {
    sender: mpsc::UnboundedSender<CheckedOutContainer>,
}

impl ReplenishHandle {
    /// Takes the container by value, so a container can be scheduled at most
    /// once.
    pub fn schedule(&self, mut container: CheckedOutContainer) {
        container.disarm();
        let id = container.id();
        if let Err(e) = self.sender.send(container) {
            error!("Replenish queue closed, container {} will leak", id);
            // Let the handle's drop report the leaked container
            drop(e.0);
        } else {
            debug!("Scheduled replenishment for container {}", id);
        }
    }
}
