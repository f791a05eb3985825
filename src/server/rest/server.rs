use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::docker::{DockerClient, DockerConfig, DockerProvisioner};
use crate::lifecycle::PoolMaintenance;
use crate::mounts::MountManager;
use crate::runner::HttpRunner;
use crate::server::rest::create_router;
use crate::shared::AppState;
use crate::store::{GiteaStore, VcsProjectStore};

/// Connects to the Docker daemon and builds the provisioner used by the pool.
pub async fn docker_provisioner(config: &Config, mounts: Arc<MountManager>) -> Result<DockerProvisioner> {
    let client = DockerClient::new(DockerConfig {
        socket_path: config.docker_socket.clone(),
    })
    .await?;

    Ok(DockerProvisioner::new(Arc::new(client), config.docker.clone(), mounts))
}

pub async fn run_rest_server(config: Config) -> Result<()> {
    info!(
        r#"
                     _                   _
 ___  __ _ _ __   __| |_ __   ___   ___ | |
/ __|/ _` | '_ \ / _` | '_ \ / _ \ / _ \| |
\__ \ (_| | | | | (_| | |_) | (_) | (_) | |
|___/\__,_|_| |_|\__,_| .__/ \___/ \___/|_|
                      |_|
Starting sandpool REST API service...
PID: {}
"#,
        std::process::id()
    );

    let mounts = Arc::new(MountManager::new(&config.mounts_path));
    tokio::fs::create_dir_all(&config.mounts_path)
        .await
        .with_context(|| format!("Failed to create mount root {}", config.mounts_path.display()))?;

    info!("Connecting to Docker daemon...");
    let provisioner = docker_provisioner(&config, mounts.clone())
        .await
        .context("Docker is not available. Please check SANDPOOL_DOCKER_SOCKET")?;

    let store = GiteaStore::new(config.store.clone());
    let projects = VcsProjectStore::new(Arc::new(store), config.artifact_matcher());

    let state = Arc::new(AppState::assemble(
        Arc::new(provisioner),
        Arc::new(HttpRunner::new()),
        Arc::new(projects),
        mounts,
        config.pool.clone(),
    ));

    info!("Filling pool to depth {}...", config.pool.depth);
    let provisioned = state.pool.fill_pool(config.pool.depth).await;
    if provisioned < config.pool.depth {
        warn!(
            "Only {} of {} containers provisioned at startup, maintenance will retry",
            provisioned, config.pool.depth
        );
    }

    let maintenance = PoolMaintenance::new(&state).start();

    info!("Building REST API routes...");
    let app = create_router(state.clone());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Binding to: {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    info!("Server started successfully!");
    info!("REST API Endpoint: http://{}/api/v0", bind_addr);
    info!("Swagger UI: http://{}/swagger-ui/", bind_addr);
    info!("Ready to accept requests...");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    maintenance.abort();
    release_containers(&state).await;

    result?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutting down sandpool server...");
}

/// Destroys idle and leased containers so none outlive the process.
async fn release_containers(state: &AppState) {
    let idle = state.pool.drain_idle();
    let leased = state.binder.drain();
    info!(
        "Destroying {} idle and {} leased container(s)",
        idle.len(),
        leased.len()
    );

    let idle_results = join_all(idle.into_iter().map(|c| state.pool.destroy_idle(c))).await;
    let leased_results = join_all(leased.into_iter().map(|c| state.pool.destroy(c))).await;

    for e in idle_results.into_iter().chain(leased_results).filter_map(|r| r.err()) {
        warn!("Container teardown at shutdown failed: {}", e);
    }
}
