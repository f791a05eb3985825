use async_trait::async_trait;
use bollard::container::Config;
use bollard::models::{HostConfig, Mount, MountTypeEnum};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::{DockerClient, DockerSandboxConfig, MANAGED_LABEL, CONTAINER_ID_LABEL};
use crate::mounts::MountManager;
use crate::pool::{ContainerId, Endpoint, IdleContainer, PoolError, Provisioner};

pub fn container_name(id: ContainerId) -> String {
    format!("sandpool-{}", id)
}

/// Provisions sandboxes as Docker containers with a per-container bind mount.
pub struct DockerProvisioner {
    client: Arc<DockerClient>,
    config: DockerSandboxConfig,
    mounts: Arc<MountManager>,
    image_ready: OnceCell<()>,
}

impl DockerProvisioner {
    pub fn new(client: Arc<DockerClient>, config: DockerSandboxConfig, mounts: Arc<MountManager>) -> Self {
        Self {
            client,
            config,
            mounts,
            image_ready: OnceCell::new(),
        }
    }

    async fn ensure_image(&self) -> Result<(), PoolError> {
        self.image_ready
            .get_or_try_init(|| async {
                if !self.client.image_exists(&self.config.image).await {
                    self.client.pull_image(&self.config.image).await?;
                }
                Ok::<(), PoolError>(())
            })
            .await?;
        Ok(())
    }

    fn container_config(&self, id: ContainerId) -> Config<String> {
        let mount_path = self.mounts.mount_path(id);

        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
        labels.insert(CONTAINER_ID_LABEL.to_string(), id.to_string());

        let host_config = HostConfig {
            memory: Some(self.config.memory_limit),
            memory_swap: Some(self.config.memory_limit), // Prevent swap usage
            cpu_quota: Some((self.config.cpu_limit * 100000.0) as i64),
            cpu_period: Some(100000),
            mounts: Some(vec![Mount {
                target: Some("/workspace".to_string()),
                source: Some(mount_path.to_string_lossy().into_owned()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(false),
                ..Default::default()
            }]),
            network_mode: self.config.network.clone(),
            auto_remove: Some(false),
            ..Default::default()
        };

        Config {
            image: Some(self.config.image.clone()),
            hostname: Some(format!("sandbox-{}", &id.to_string()[..8])),
            env: Some(vec![
                format!("SANDPOOL_CONTAINER_UUID={}", id),
                format!("SANDPOOL_RUNNER_PORT={}", self.config.runner_port),
            ]),
            labels: Some(labels),
            host_config: Some(host_config),
            working_dir: Some("/workspace".to_string()),
            ..Default::default()
        }
    }

    async fn start(&self, id: ContainerId) -> Result<Endpoint, PoolError> {
        let name = container_name(id);
        self.client.create_container(&name, self.container_config(id)).await?;
        self.client.start_container(&name).await?;

        let ip = self
            .client
            .container_ip(&name, self.config.network.as_deref())
            .await?
            .ok_or(PoolError::NoAddress(id))?;

        Ok(Endpoint {
            ip,
            port: self.config.runner_port,
        })
    }

    /// Removes every container carrying the managed label, together with the
    /// mount directories left on disk. Returns the number of containers removed.
    pub async fn prune(&self) -> Result<usize, PoolError> {
        let containers = self.client.list_labeled_containers(&format!("{}=true", MANAGED_LABEL)).await?;
        let mut removed = 0;

        for container in containers {
            let Some(docker_id) = container.id else {
                continue;
            };
            match self.client.remove_container(&docker_id).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove container {}: {}", docker_id, e),
            }
        }

        for id in self.mounts.list().await? {
            self.mounts.remove(id).await?;
        }

        info!("Pruned {} managed container(s)", removed);
        Ok(removed)
    }
}

#[async_trait]
impl Provisioner for DockerProvisioner {
    async fn provision(&self) -> Result<IdleContainer, PoolError> {
        self.ensure_image().await?;

        let id = ContainerId::new();
        self.mounts.create(id).await?;

        match self.start(id).await {
            Ok(endpoint) => {
                info!("Provisioned container {} at {}", id, endpoint);
                Ok(IdleContainer::new(id, endpoint))
            }
            Err(e) => {
                // Do not leave half-created sandboxes behind
                if let Err(cleanup) = self.destroy(id).await {
                    warn!("Cleanup of container {} failed: {}", id, cleanup);
                }
                Err(e)
            }
        }
    }

    async fn destroy(&self, id: ContainerId) -> Result<(), PoolError> {
        self.client
            .remove_container(&container_name(id))
            .await
            .map_err(|e| PoolError::Destroy {
                id,
                reason: e.to_string(),
            })?;
        self.mounts.remove(id).await?;

        info!("Destroyed container {}", id);
        Ok(())
    }
}
