use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::pool::ContainerPool;
use crate::session::SessionBinder;
use crate::shared::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub provisioned: usize,
    pub reaped: usize,
}

/// Periodic upkeep: tops the pool back up to its target depth and
/// reclaims containers whose lease expired before `start*` was called.
#[derive(Clone)]
pub struct PoolMaintenance {
    pool: Arc<ContainerPool>,
    binder: Arc<SessionBinder>,
    every: Duration,
    lease_ttl: Duration,
}

impl PoolMaintenance {
    pub fn new(state: &AppState) -> Self {
        Self {
            pool: state.pool.clone(),
            binder: state.binder.clone(),
            every: state.settings.maintenance_interval,
            lease_ttl: state.settings.lease_ttl,
        }
    }

    pub async fn run_once(&self) -> MaintenanceReport {
        let reaped = self.binder.reap_expired(self.lease_ttl);
        if reaped > 0 {
            warn!("Reclaimed {} container(s) with expired leases", reaped);
        }

        let provisioned = self.pool.fill_pool(self.pool.target_depth()).await;
        if provisioned > 0 {
            info!("Maintenance provisioned {} container(s)", provisioned);
        }

        MaintenanceReport { provisioned, reaped }
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately and startup has just filled the pool
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let report = self.run_once().await;
                debug!(
                    provisioned = report.provisioned,
                    reaped = report.reaped,
                    idle = self.pool.idle_len(),
                    "Pool maintenance pass"
                );
            }
        })
    }
}
