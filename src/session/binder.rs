use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::artifact::{Artifact, SourceFile};
use crate::mounts::MountManager;
use crate::pool::{CheckedOutContainer, ContainerId, ContainerPool, Endpoint, Purpose, ReplenishHandle};
use crate::store::ProjectStore;

/// Coordinates returned by `prepare*` and echoed back by the caller on `start*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContainerTicket {
    #[schema(value_type = String, format = Uuid)]
    pub container_uuid: ContainerId,
    #[schema(value_type = String)]
    pub ip: IpAddr,
    pub port: u16,
}

impl ContainerTicket {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            ip: self.ip,
            port: self.port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// Container staged and leased to the caller.
    Ready(ContainerTicket),
    /// The project has nothing to execute; no container was taken.
    NotExecutable,
    /// The pool is empty right now.
    Unavailable,
    /// The project's files could not be loaded; no container was taken.
    StoreUnavailable(String),
    Failed(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BindError {
    #[error("No prepared container {0}")]
    UnknownContainer(ContainerId),

    #[error("Container {0} is not at the given address")]
    AddressMismatch(ContainerId),

    #[error("Container {id} was prepared for {prepared}, not {requested}")]
    PurposeMismatch {
        id: ContainerId,
        prepared: Purpose,
        requested: Purpose,
    },

    #[error("Container {0} was prepared for another project")]
    ProjectMismatch(ContainerId),
}

struct Lease {
    container: CheckedOutContainer,
    project: Uuid,
    leased_at: Instant,
}

/// Binds pool containers to requests between the `prepare*` and `start*`
/// calls. A container is only leased after staging has finished.
pub struct SessionBinder {
    pool: Arc<ContainerPool>,
    mounts: Arc<MountManager>,
    projects: Arc<dyn ProjectStore>,
    replenisher: ReplenishHandle,
    leases: Mutex<HashMap<ContainerId, Lease>>,
}

impl SessionBinder {
    pub fn new(
        pool: Arc<ContainerPool>,
        mounts: Arc<MountManager>,
        projects: Arc<dyn ProjectStore>,
        replenisher: ReplenishHandle,
    ) -> Self {
        Self {
            pool,
            mounts,
            projects,
            replenisher,
            leases: Mutex::new(HashMap::new()),
        }
    }

    /// Stages source files for compilation. With no files given, the
    /// project's current sources are loaded from the store.
    pub async fn prepare_compile(&self, project: Uuid, files: Vec<SourceFile>) -> PrepareOutcome {
        let artifacts: Vec<Artifact> = if files.is_empty() {
            match self.projects.load_sources(project).await {
                Ok(sources) => sources,
                Err(e) => {
                    error!("Failed to load sources of project {}: {}", project, e);
                    return PrepareOutcome::StoreUnavailable(format!("could not load project files: {}", e));
                }
            }
        } else {
            files.into_iter().map(Artifact::from).collect()
        };

        self.prepare(Purpose::Compile, project, artifacts).await
    }

    pub async fn prepare_execute(&self, project: Uuid) -> PrepareOutcome {
        self.prepare_from_compiled(Purpose::Execute, project).await
    }

    pub async fn prepare_test(&self, project: Uuid) -> PrepareOutcome {
        self.prepare_from_compiled(Purpose::Test, project).await
    }

    async fn prepare_from_compiled(&self, purpose: Purpose, project: Uuid) -> PrepareOutcome {
        let compiled = match self.projects.load_compiled_artifacts(project).await {
            Ok(compiled) => compiled,
            Err(e) => {
                error!("Failed to load compiled artifacts of project {}: {}", project, e);
                return PrepareOutcome::StoreUnavailable(format!("could not load compiled files: {}", e));
            }
        };

        if compiled.is_empty() {
            info!("Project {} has no compiled artifacts, not preparing {}", project, purpose);
            return PrepareOutcome::NotExecutable;
        }

        self.prepare(purpose, project, compiled).await
    }

    /// Checks out a container, stages `artifacts` into its mount and leases it.
    pub async fn prepare(&self, purpose: Purpose, project: Uuid, artifacts: Vec<Artifact>) -> PrepareOutcome {
        let Some(idle) = self.pool.acquire() else {
            warn!("No idle container for {} of project {}", purpose, project);
            return PrepareOutcome::Unavailable;
        };

        let mut container = idle.check_out(purpose);
        container.replace_on_drop(self.replenisher.clone());
        let id = container.id();

        if let Err(e) = self.mounts.stage(id, &artifacts).await {
            error!("Staging into container {} failed: {}", id, e);
            container.mark_failed();
            self.replenisher.schedule(container);
            return PrepareOutcome::Failed(format!("could not stage files: {}", e));
        }

        let endpoint = container.endpoint();
        self.lock().insert(
            id,
            Lease {
                container,
                project,
                leased_at: Instant::now(),
            },
        );

        info!("Container {} prepared for {} of project {}", id, purpose, project);
        PrepareOutcome::Ready(ContainerTicket {
            container_uuid: id,
            ip: endpoint.ip,
            port: endpoint.port,
        })
    }

    /// Hands the leased container to the caller. The lease stays in place if
    /// anything about the ticket does not match.
    pub fn take_lease(
        &self,
        ticket: &ContainerTicket,
        purpose: Purpose,
        project: Uuid,
    ) -> Result<CheckedOutContainer, BindError> {
        let id = ticket.container_uuid;
        let mut leases = self.lock();
        let lease = leases.get(&id).ok_or(BindError::UnknownContainer(id))?;

        if lease.container.endpoint() != ticket.endpoint() {
            return Err(BindError::AddressMismatch(id));
        }
        if lease.container.purpose() != purpose {
            return Err(BindError::PurposeMismatch {
                id,
                prepared: lease.container.purpose(),
                requested: purpose,
            });
        }
        if lease.project != project {
            return Err(BindError::ProjectMismatch(id));
        }

        leases
            .remove(&id)
            .map(|lease| lease.container)
            .ok_or(BindError::UnknownContainer(id))
    }

    /// Drops leases whose `start*` call never came and schedules their
    /// containers for replacement.
    pub fn reap_expired(&self, ttl: Duration) -> usize {
        let expired: Vec<Lease> = {
            let mut leases = self.lock();
            let ids: Vec<ContainerId> = leases
                .iter()
                .filter(|(_, lease)| lease.leased_at.elapsed() > ttl)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| leases.remove(id)).collect()
        };

        let count = expired.len();
        for lease in expired {
            let mut container = lease.container;
            warn!(
                "Lease on container {} for project {} expired unused",
                container.id(),
                lease.project
            );
            container.mark_failed();
            self.replenisher.schedule(container);
        }
        count
    }

    /// Removes every lease and hands the containers back for teardown.
    pub fn drain(&self) -> Vec<CheckedOutContainer> {
        self.lock().drain().map(|(_, lease)| lease.container).collect()
    }

    pub fn lease_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ContainerId, Lease>> {
        self.leases.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
