use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::mounts::{MountError, MountManager};
use crate::pool::{CheckedOutContainer, ContainerId, Purpose};
use super::binder::{BindError, ContainerTicket, SessionBinder};
use crate::runner::{RunOutput, Runner};
use crate::store::{ProjectStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    CompiledAndSaved,
    /// The code compiled but its output could not be persisted.
    CompiledNotSaved,
    CompileFailed,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExecutionResult {
    #[schema(value_type = String, format = Uuid)]
    pub container_uuid: ContainerId,
    pub purpose: Purpose,
    pub status: ExecutionStatus,
    pub exit_code: Option<i64>,
    pub stdout: String,
    pub stderr: String,
    pub artifacts: Vec<Artifact>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::CompiledAndSaved | ExecutionStatus::Succeeded
        )
    }
}

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Could not collect compile output: {0}")]
    Collect(#[from] MountError),

    #[error("Could not persist compile output: {0}")]
    Persist(#[from] StoreError),
}

/// A finished action together with the container it consumed, which the
/// caller hands to the replenisher. Dropping it schedules the replacement too.
#[derive(Debug)]
pub struct Completed {
    pub result: ExecutionResult,
    pub spent: CheckedOutContainer,
}

pub struct ExecutionCoordinator {
    runner: Arc<dyn Runner>,
    mounts: Arc<MountManager>,
    projects: Arc<dyn ProjectStore>,
    run_timeout: Duration,
}

impl ExecutionCoordinator {
    pub fn new(
        runner: Arc<dyn Runner>,
        mounts: Arc<MountManager>,
        projects: Arc<dyn ProjectStore>,
        run_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            mounts,
            projects,
            run_timeout,
        }
    }

    /// Redeems `ticket` with the binder and executes the leased container.
    /// A rejected ticket consumes nothing.
    pub async fn start(
        &self,
        binder: &SessionBinder,
        purpose: Purpose,
        project: Uuid,
        ticket: &ContainerTicket,
    ) -> Result<Completed, BindError> {
        let container = binder.take_lease(ticket, purpose, project)?;
        Ok(self.execute(project, container).await)
    }

    /// Runs the container's action and, for a successful compile, saves the
    /// output before the container is given back.
    pub async fn execute(&self, project: Uuid, mut container: CheckedOutContainer) -> Completed {
        let started = Instant::now();
        let id = container.id();
        let purpose = container.purpose();

        let mut result = ExecutionResult {
            container_uuid: id,
            purpose,
            status: ExecutionStatus::Failed,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            artifacts: Vec::new(),
            error: None,
            duration_ms: 0,
        };

        match self.run(&mut container).await {
            Ok(output) => {
                result.exit_code = Some(output.exit_code);
                result.status = match (purpose, output.succeeded()) {
                    (Purpose::Compile, true) => match self.save_result(&container, project).await {
                        Ok(saved) => {
                            result.artifacts = saved;
                            ExecutionStatus::CompiledAndSaved
                        }
                        Err(e) => {
                            error!("Compile in container {} succeeded but saving failed: {}", id, e);
                            result.error = Some(e.to_string());
                            ExecutionStatus::CompiledNotSaved
                        }
                    },
                    (Purpose::Compile, false) => ExecutionStatus::CompileFailed,
                    (_, true) => ExecutionStatus::Succeeded,
                    (_, false) => ExecutionStatus::Failed,
                };
                result.stdout = output.stdout;
                result.stderr = output.stderr;
            }
            Err(reason) => {
                result.error = Some(reason);
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            container = %id,
            project = %project,
            purpose = %purpose,
            status = ?result.status,
            duration_ms = result.duration_ms,
            "Execution finished"
        );

        Completed {
            result,
            spent: container,
        }
    }

    /// Calls the sandbox, bounded by the configured timeout.
    pub async fn run(&self, container: &mut CheckedOutContainer) -> Result<RunOutput, String> {
        container.mark_running();
        let id = container.id();
        let call = self.runner.run(id, container.endpoint(), container.purpose());

        match tokio::time::timeout(self.run_timeout, call).await {
            Ok(Ok(output)) => {
                container.mark_completed();
                Ok(output)
            }
            Ok(Err(e)) => {
                warn!("Container {} failed: {}", id, e);
                container.mark_failed();
                Err(e.to_string())
            }
            Err(_) => {
                warn!("Container {} timed out after {:?}", id, self.run_timeout);
                container.mark_failed();
                Err(format!("timed out after {} seconds", self.run_timeout.as_secs()))
            }
        }
    }

    /// Persists the compile output found in the container's mount.
    pub async fn save_result(
        &self,
        container: &CheckedOutContainer,
        project: Uuid,
    ) -> Result<Vec<Artifact>, SaveError> {
        let output = self.mounts.collect_output(container.id()).await?;
        if output.is_empty() {
            warn!("Compile in container {} produced no output", container.id());
            return Ok(output);
        }
        Ok(self.projects.persist_compiled_artifacts(project, &output).await?)
    }
}
