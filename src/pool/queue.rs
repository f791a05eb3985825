use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use super::{CheckedOutContainer, ContainerId, IdleContainer, PoolError, Provisioner};

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct PoolStats {
    pub provisioned: u64,
    pub provision_failures: u64,
    pub checkouts: u64,
    pub exhausted: u64,
    pub destroyed: u64,
    pub destroy_failures: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PoolSnapshot {
    pub idle: usize,
    pub provisioning: usize,
    /// Checked out and not yet handed over for replacement.
    pub checked_out: usize,
    pub target_depth: usize,
    pub stats: PoolStats,
}

struct PoolState {
    idle: VecDeque<IdleContainer>,
    // Slots reserved for provisioning calls that have not returned yet
    provisioning: usize,
    // Acquired containers whose replacement has not started; the replenisher
    // owes the pool one container for each
    checked_out: usize,
    stats: PoolStats,
}

/// Process-wide supply of idle sandboxes.
///
/// The mutex guards only the queue and the provisioning reservation count;
/// provisioning and destruction run outside of it.
pub struct ContainerPool {
    provisioner: Arc<dyn Provisioner>,
    target_depth: usize,
    state: Mutex<PoolState>,
}

impl ContainerPool {
    pub fn new(provisioner: Arc<dyn Provisioner>, target_depth: usize) -> Self {
        Self {
            provisioner,
            target_depth,
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(target_depth),
                provisioning: 0,
                checked_out: 0,
                stats: PoolStats::default(),
            }),
        }
    }

    pub fn target_depth(&self) -> usize {
        self.target_depth
    }

    /// Provisions until idle, in-flight and owed replacements reach
    /// `target_depth`. Returns the number of containers actually added.
    pub async fn fill_pool(&self, target_depth: usize) -> usize {
        let deficit = {
            let mut state = self.lock();
            let covered = state.idle.len() + state.provisioning + state.checked_out;
            let deficit = target_depth.saturating_sub(covered);
            state.provisioning += deficit;
            deficit
        };

        if deficit == 0 {
            return 0;
        }

        debug!("Filling pool with {} container(s)", deficit);
        let results = join_all((0..deficit).map(|_| self.provision_reserved())).await;
        let added = results.into_iter().filter(|added| *added).count();

        if added < deficit {
            warn!(
                "Pool fill provisioned {}/{} container(s); the rest will be retried",
                added, deficit
            );
        } else {
            info!("Pool filled with {} new container(s)", added);
        }
        added
    }

    /// Removes one idle container. `None` means no capacity right now.
    pub fn acquire(&self) -> Option<IdleContainer> {
        let mut state = self.lock();
        match state.idle.pop_front() {
            Some(container) => {
                state.stats.checkouts += 1;
                state.checked_out += 1;
                debug!(
                    container = %container.id(),
                    idle_secs = (Utc::now() - container.provisioned_at()).num_seconds(),
                    "Checked out idle container"
                );
                Some(container)
            }
            None => {
                state.stats.exhausted += 1;
                None
            }
        }
    }

    /// Provisions exactly one container and enqueues it, regardless of the
    /// current depth.
    pub async fn provision_replacement(&self) -> Result<ContainerId, PoolError> {
        {
            let mut state = self.lock();
            state.checked_out = state.checked_out.saturating_sub(1);
            state.provisioning += 1;
        }
        let result = self.provisioner.provision().await;

        let mut state = self.lock();
        state.provisioning -= 1;
        match result {
            Ok(container) => {
                let id = container.id();
                state.idle.push_back(container);
                state.stats.provisioned += 1;
                Ok(id)
            }
            Err(e) => {
                state.stats.provision_failures += 1;
                Err(e)
            }
        }
    }

    /// Tears down a consumed container. The handle is always marked
    /// destroyed, even if the backend call fails.
    pub async fn destroy(&self, mut container: CheckedOutContainer) -> Result<(), PoolError> {
        let id = container.id();
        debug!(
            container = %id,
            held_ms = (Utc::now() - container.checked_out_at()).num_milliseconds(),
            "Destroying consumed container"
        );
        container.mark_destroyed();
        drop(container);

        let result = self.provisioner.destroy(id).await;
        let mut state = self.lock();
        match &result {
            Ok(()) => state.stats.destroyed += 1,
            Err(_) => state.stats.destroy_failures += 1,
        }
        result
    }

    /// Removes every idle container from the pool, for shutdown.
    pub fn drain_idle(&self) -> Vec<IdleContainer> {
        self.lock().idle.drain(..).collect()
    }

    pub async fn destroy_idle(&self, container: IdleContainer) -> Result<(), PoolError> {
        self.provisioner.destroy(container.id()).await
    }

    pub fn idle_len(&self) -> usize {
        self.lock().idle.len()
    }

    pub fn contains(&self, id: ContainerId) -> bool {
        self.lock().idle.iter().any(|c| c.id() == id)
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.lock();
        PoolSnapshot {
            idle: state.idle.len(),
            provisioning: state.provisioning,
            checked_out: state.checked_out,
            target_depth: self.target_depth,
            stats: state.stats.clone(),
        }
    }

    async fn provision_reserved(&self) -> bool {
        let result = self.provisioner.provision().await;

        let mut state = self.lock();
        state.provisioning -= 1;
        match result {
            Ok(container) => {
                state.idle.push_back(container);
                state.stats.provisioned += 1;
                true
            }
            Err(e) => {
                state.stats.provision_failures += 1;
                error!("Failed to provision container: {}", e);
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Critical sections never panic midway, so a poisoned queue is still consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Endpoint, Purpose};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingProvisioner {
        provisioned: AtomicUsize,
        destroyed: AtomicUsize,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl Provisioner for CountingProvisioner {
        async fn provision(&self) -> Result<IdleContainer, PoolError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let n = self.provisioned.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|limit| n >= limit) {
                return Err(PoolError::Provision("quota exceeded".to_string()));
            }
            Ok(IdleContainer::new(
                ContainerId::new(),
                Endpoint {
                    ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                    port: 8080,
                },
            ))
        }

        async fn destroy(&self, _id: ContainerId) -> Result<(), PoolError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn fill_pool_reaches_target_and_is_idempotent() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let pool = ContainerPool::new(provisioner.clone(), 3);

        assert_eq!(pool.fill_pool(3).await, 3);
        assert_eq!(pool.fill_pool(3).await, 0);
        assert_eq!(pool.idle_len(), 3);
        assert_eq!(provisioner.provisioned.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn concurrent_fills_never_over_provision() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let pool = Arc::new(ContainerPool::new(provisioner.clone(), 4));

        let fills: Vec<_> = (0..5)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.fill_pool(4).await })
            })
            .collect();
        let added: usize = join_all(fills).await.into_iter().map(|r| r.unwrap()).sum();

        assert_eq!(added, 4);
        assert_eq!(pool.idle_len(), 4);
        assert_eq!(provisioner.provisioned.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn acquire_hands_out_each_container_once() {
        let pool = Arc::new(ContainerPool::new(Arc::new(CountingProvisioner::default()), 5));
        pool.fill_pool(5).await;

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.acquire().map(|c| c.id()) })
            })
            .collect();
        let acquired: Vec<ContainerId> = join_all(handles)
            .await
            .into_iter()
            .filter_map(|r| r.unwrap())
            .collect();

        let unique: HashSet<_> = acquired.iter().copied().collect();
        assert_eq!(acquired.len(), 5);
        assert_eq!(unique.len(), 5);
        assert!(pool.acquire().is_none());
        assert_eq!(pool.snapshot().stats.exhausted, 8);
    }

    #[tokio::test]
    async fn failed_provisioning_is_counted_and_retried_on_next_fill() {
        let provisioner = Arc::new(CountingProvisioner {
            fail_after: Some(2),
            ..Default::default()
        });
        let pool = ContainerPool::new(provisioner, 3);

        assert_eq!(pool.fill_pool(3).await, 2);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.idle, 2);
        assert_eq!(snapshot.provisioning, 0);
        assert_eq!(snapshot.stats.provision_failures, 1);
    }

    #[tokio::test]
    async fn fill_leaves_room_for_owed_replacements() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let pool = ContainerPool::new(provisioner.clone(), 2);
        pool.fill_pool(2).await;

        let container = pool.acquire().unwrap().check_out(Purpose::Compile);
        assert_eq!(pool.fill_pool(2).await, 0);
        assert_eq!(pool.snapshot().checked_out, 1);

        pool.destroy(container).await.unwrap();
        pool.provision_replacement().await.unwrap();

        let snapshot = pool.snapshot();
        assert_eq!(snapshot.idle, 2);
        assert_eq!(snapshot.checked_out, 0);
        assert_eq!(provisioner.provisioned.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn destroy_marks_handle_and_counts() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let pool = ContainerPool::new(provisioner.clone(), 1);
        pool.fill_pool(1).await;

        let container = pool.acquire().unwrap().check_out(Purpose::Test);
        pool.destroy(container).await.unwrap();

        assert_eq!(provisioner.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.snapshot().stats.destroyed, 1);
        assert_eq!(pool.idle_len(), 0);
    }
}
