use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::artifact::ArtifactMatcher;
use crate::docker::DockerSandboxConfig;
use crate::store::GiteaConfig;

const PREFIX: &str = "SANDPOOL_";

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_dir: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolConfig {
    /// Idle containers kept ready.
    pub depth: usize,
    pub run_timeout: Duration,
    /// How long a prepared container waits for its `start*` call.
    pub lease_ttl: Duration,
    pub replenish_workers: usize,
    pub maintenance_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            depth: 3,
            run_timeout: Duration::from_secs(30),
            lease_ttl: Duration::from_secs(300),
            replenish_workers: 2,
            maintenance_interval: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub pool: PoolConfig,
    pub docker: DockerSandboxConfig,
    pub docker_socket: Option<String>,
    pub mounts_path: PathBuf,
    #[serde(skip)]
    pub store: GiteaConfig,
    pub compiled_suffixes: String,
}

impl Config {
    /// Reads `SANDPOOL_*` variables, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", PREFIX, name)).filter(|v| !v.trim().is_empty());
        let defaults = PoolConfig::default();
        let docker_defaults = DockerSandboxConfig::default();

        let pool = PoolConfig {
            depth: parse_or(&var, "POOL_DEPTH", defaults.depth)?,
            run_timeout: Duration::from_secs(parse_or(&var, "RUN_TIMEOUT_SECS", defaults.run_timeout.as_secs())?),
            lease_ttl: Duration::from_secs(parse_or(&var, "LEASE_TTL_SECS", defaults.lease_ttl.as_secs())?),
            replenish_workers: parse_or(&var, "REPLENISH_WORKERS", defaults.replenish_workers)?,
            maintenance_interval: Duration::from_secs(parse_or(
                &var,
                "MAINTENANCE_INTERVAL_SECS",
                defaults.maintenance_interval.as_secs(),
            )?),
        };

        if pool.replenish_workers == 0 {
            return Err(anyhow!("{}REPLENISH_WORKERS must be at least 1", PREFIX));
        }
        if pool.run_timeout.is_zero() {
            return Err(anyhow!("{}RUN_TIMEOUT_SECS must be greater than 0", PREFIX));
        }

        let docker = DockerSandboxConfig {
            image: var("IMAGE").unwrap_or(docker_defaults.image),
            cpu_limit: parse_or(&var, "CPU_LIMIT", docker_defaults.cpu_limit)?,
            memory_limit: parse_or(&var, "MEMORY_LIMIT", docker_defaults.memory_limit)?,
            network: var("NETWORK").or(docker_defaults.network),
            runner_port: parse_or(&var, "RUNNER_PORT", docker_defaults.runner_port)?,
        };

        let store = GiteaConfig {
            base_url: var("VCS_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
            public_url: var("VCS_PUBLIC_URL"),
            owner: var("VCS_OWNER").unwrap_or_else(|| "sandpool".to_string()),
            token: var("VCS_TOKEN"),
        };

        Ok(Self {
            server: ServerConfig {
                host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&var, "PORT", 9000)?,
                log_dir: var("LOG_DIR").unwrap_or_else(|| "./logs".to_string()),
            },
            pool,
            docker,
            docker_socket: var("DOCKER_SOCKET"),
            mounts_path: var("MOUNTS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/var/lib/sandpool/mounts")),
            store,
            compiled_suffixes: var("COMPILED_SUFFIXES").unwrap_or_else(|| ".class".to_string()),
        })
    }

    pub fn artifact_matcher(&self) -> ArtifactMatcher {
        ArtifactMatcher::from_list(&self.compiled_suffixes)
    }
}

fn parse_or<T, V>(var: &V, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid value for {}{}: {:?} ({})", PREFIX, name, raw, e)),
        None => Ok(default),
    }
}
