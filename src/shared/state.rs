use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::PoolConfig;
use crate::mounts::MountManager;
use crate::pool::{ContainerPool, Provisioner, ReplenishHandle, Replenisher};
use crate::runner::Runner;
use crate::session::{ExecutionCoordinator, SessionBinder};
use crate::store::ProjectStore;

/// Everything the request handlers share.
pub struct AppState {
    pub pool: Arc<ContainerPool>,
    pub binder: Arc<SessionBinder>,
    pub coordinator: Arc<ExecutionCoordinator>,
    pub replenisher: ReplenishHandle,
    pub settings: PoolConfig,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wires the pool, binder and coordinator together and starts the
    /// replenish workers. Must be called inside a Tokio runtime.
    pub fn assemble(
        provisioner: Arc<dyn Provisioner>,
        runner: Arc<dyn Runner>,
        projects: Arc<dyn ProjectStore>,
        mounts: Arc<MountManager>,
        settings: PoolConfig,
    ) -> Self {
        let pool = Arc::new(ContainerPool::new(provisioner, settings.depth));
        let replenisher = Replenisher::new(pool.clone()).spawn(settings.replenish_workers);

        let binder = Arc::new(SessionBinder::new(
            pool.clone(),
            mounts.clone(),
            projects.clone(),
            replenisher.clone(),
        ));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            runner,
            mounts,
            projects,
            settings.run_timeout,
        ));

        Self {
            pool,
            binder,
            coordinator,
            replenisher,
            settings,
            started_at: Utc::now(),
        }
    }
}
