mod client;
mod provisioner;

pub use client::{DockerClient, DockerConfig};
pub use provisioner::{container_name, DockerProvisioner};

use serde::{Deserialize, Serialize};

pub const MANAGED_LABEL: &str = "sandpool.managed";
pub const CONTAINER_ID_LABEL: &str = "sandpool.container.id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerSandboxConfig {
    pub image: String,
    pub cpu_limit: f64,   // Number of CPUs (e.g., 0.5 for half a CPU)
    pub memory_limit: i64, // Memory in bytes
    pub network: Option<String>,
    /// Port the in-sandbox runner agent listens on.
    pub runner_port: u16,
}

impl Default for DockerSandboxConfig {
    fn default() -> Self {
        Self {
            image: "sandpool-runner:latest".to_string(),
            cpu_limit: 0.5,
            memory_limit: 512 * 1024 * 1024, // 512MB
            network: None,
            runner_port: 8080,
        }
    }
}
