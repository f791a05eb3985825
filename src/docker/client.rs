use anyhow::{Context, Result};
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerInspectResponse, ContainerSummary};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DockerConfig {
    /// Unix socket of the daemon; the platform default when unset.
    pub socket_path: Option<String>,
}

pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    pub async fn new(config: DockerConfig) -> Result<Self> {
        let docker = if let Some(socket) = config.socket_path {
            Docker::connect_with_socket(&socket, 120, API_DEFAULT_VERSION)?
        } else {
            Docker::connect_with_socket_defaults()?
        };

        // Test connection
        let version = docker
            .version()
            .await
            .context("Failed to connect to Docker daemon")?;

        info!(
            "Connected to Docker daemon version: {}",
            version.version.unwrap_or_default()
        );

        Ok(Self { docker })
    }

    pub async fn image_exists(&self, image: &str) -> bool {
        self.docker.inspect_image(image).await.is_ok()
    }

    pub async fn pull_image(&self, image: &str) -> Result<(), BollardError> {
        info!("Pulling Docker image: {}", image);

        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(info) = stream.next().await {
            match info {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    error!("Error pulling image: {}", e);
                    return Err(e);
                }
            }
        }

        info!("Successfully pulled image: {}", image);
        Ok(())
    }

    pub async fn create_container(&self, name: &str, config: Config<String>) -> Result<String, BollardError> {
        let options = CreateContainerOptions {
            name,
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;

        debug!("Created container {} with ID: {}", name, response.id);
        Ok(response.id)
    }

    pub async fn start_container(&self, id: &str) -> Result<(), BollardError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;

        debug!("Started container: {}", id);
        Ok(())
    }

    /// Force-removes the container. A container that is already gone counts
    /// as removed.
    pub async fn remove_container(&self, id: &str) -> Result<(), BollardError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => {
                debug!("Removed container: {}", id);
                Ok(())
            }
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => {
                debug!("Container {} already removed", id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, BollardError> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
    }

    /// Address of the container on `network`, or on the default bridge.
    pub async fn container_ip(&self, id: &str, network: Option<&str>) -> Result<Option<IpAddr>, BollardError> {
        let info = self.inspect_container(id).await?;
        let Some(settings) = info.network_settings else {
            return Ok(None);
        };

        let on_network = settings.networks.as_ref().and_then(|networks| match network {
            Some(name) => networks.get(name).and_then(|ep| ep.ip_address.clone()),
            None => networks.values().find_map(|ep| ep.ip_address.clone()),
        });

        #[allow(deprecated)]
        let address = on_network.or(settings.ip_address);

        Ok(address
            .filter(|ip| !ip.is_empty())
            .and_then(|ip| ip.parse().ok()))
    }

    pub async fn list_labeled_containers(&self, label: &str) -> Result<Vec<ContainerSummary>, BollardError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label.to_string()]);

        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        self.docker.list_containers(Some(options)).await
    }
}
