// Shared fakes and harness for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use sandpool::artifact::Artifact;
use sandpool::config::PoolConfig;
use sandpool::mounts::MountManager;
use sandpool::pool::{ContainerId, Endpoint, IdleContainer, PoolError, Provisioner, Purpose};
use sandpool::runner::{RunOutput, Runner, RunnerError};
use sandpool::server::rest::create_router;
use sandpool::shared::AppState;
use sandpool::store::{ProjectStore, StoreError};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// Hands out containers backed by real mount directories, each on its own
/// address.
pub struct FakeProvisioner {
    mounts: Arc<MountManager>,
    next_host: AtomicU32,
    pub fail: AtomicBool,
    pub delay: Mutex<Duration>,
    pub provisioned: Mutex<Vec<ContainerId>>,
    pub destroyed: Mutex<Vec<ContainerId>>,
}

impl FakeProvisioner {
    pub fn new(mounts: Arc<MountManager>) -> Self {
        Self {
            mounts,
            next_host: AtomicU32::new(1),
            fail: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            provisioned: Mutex::new(Vec::new()),
            destroyed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn provisioned_count(&self) -> usize {
        self.provisioned.lock().unwrap().len()
    }

    pub fn destroyed_ids(&self) -> Vec<ContainerId> {
        self.destroyed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn provision(&self) -> Result<IdleContainer, PoolError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PoolError::Provision("docker daemon unavailable".to_string()));
        }
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let id = ContainerId::new();
        self.mounts.create(id).await?;
        let host = self.next_host.fetch_add(1, Ordering::SeqCst);
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, (host / 256) as u8, (host % 256) as u8));

        self.provisioned.lock().unwrap().push(id);
        Ok(IdleContainer::new(id, Endpoint { ip, port: 8080 }))
    }

    async fn destroy(&self, id: ContainerId) -> Result<(), PoolError> {
        self.destroyed.lock().unwrap().push(id);
        self.mounts.remove(id).await?;
        Ok(())
    }
}

/// Stands in for the agent inside a sandbox. A compile turns every staged
/// `X.java` into `output/X.class`; execute and test list what was staged on
/// stdout.
pub struct ScriptedRunner {
    mounts: Arc<MountManager>,
    pub exit_code: AtomicI64,
    pub delay: Mutex<Duration>,
    pub calls: Mutex<Vec<(ContainerId, Purpose)>>,
}

impl ScriptedRunner {
    pub fn new(mounts: Arc<MountManager>) -> Self {
        Self {
            mounts,
            exit_code: AtomicI64::new(0),
            delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Runner for ScriptedRunner {
    async fn run(&self, id: ContainerId, _endpoint: Endpoint, purpose: Purpose) -> Result<RunOutput, RunnerError> {
        self.calls.lock().unwrap().push((id, purpose));
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let exit_code = self.exit_code.load(Ordering::SeqCst);
        let staged = self.mounts.staged(id).await.unwrap_or_default();

        if purpose == Purpose::Compile && exit_code == 0 {
            let output = self.mounts.mount_path(id).join("output");
            for file in staged.iter().filter(|f| f.path.ends_with(".java")) {
                let class = file.path.trim_end_matches(".java").to_string() + ".class";
                let target = output.join(&class);
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await.unwrap();
                }
                let mut bytes = b"bytecode:".to_vec();
                bytes.extend_from_slice(&file.content);
                tokio::fs::write(target, bytes).await.unwrap();
            }
        }

        let listing: Vec<&str> = staged.iter().map(|f| f.path.as_str()).collect();
        Ok(RunOutput {
            exit_code,
            stdout: listing.join(","),
            stderr: if exit_code == 0 { String::new() } else { "error: build failed".to_string() },
        })
    }
}

/// Project store keeping sources and compiled output in memory.
#[derive(Default)]
pub struct MemoryProjectStore {
    pub sources: Mutex<HashMap<Uuid, Vec<Artifact>>>,
    pub compiled: Mutex<HashMap<Uuid, Vec<Artifact>>>,
    pub fail_load: AtomicBool,
    pub fail_persist: AtomicBool,
}

impl MemoryProjectStore {
    pub fn add_source(&self, project: Uuid, path: &str, content: &str) {
        self.sources
            .lock()
            .unwrap()
            .entry(project)
            .or_default()
            .push(Artifact::new(path, content.as_bytes().to_vec()));
    }

    pub fn compiled_for(&self, project: Uuid) -> Vec<Artifact> {
        self.compiled.lock().unwrap().get(&project).cloned().unwrap_or_default()
    }

    fn check_load(&self) -> Result<(), StoreError> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 503,
                body: "store unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn load_sources(&self, project: Uuid) -> Result<Vec<Artifact>, StoreError> {
        self.check_load()?;
        Ok(self.sources.lock().unwrap().get(&project).cloned().unwrap_or_default())
    }

    async fn load_compiled_artifacts(&self, project: Uuid) -> Result<Vec<Artifact>, StoreError> {
        self.check_load()?;
        Ok(self.compiled_for(project))
    }

    async fn persist_compiled_artifacts(
        &self,
        project: Uuid,
        artifacts: &[Artifact],
    ) -> Result<Vec<Artifact>, StoreError> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 503,
                body: "store unavailable".to_string(),
            });
        }
        self.compiled.lock().unwrap().insert(project, artifacts.to_vec());
        Ok(artifacts.to_vec())
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub provisioner: Arc<FakeProvisioner>,
    pub runner: Arc<ScriptedRunner>,
    pub projects: Arc<MemoryProjectStore>,
    pub mounts: Arc<MountManager>,
    _mount_root: TempDir,
}

pub fn settings(depth: usize, run_timeout: Duration) -> PoolConfig {
    PoolConfig {
        depth,
        run_timeout,
        lease_ttl: Duration::from_secs(300),
        replenish_workers: 2,
        maintenance_interval: Duration::from_secs(3600),
    }
}

/// Builds the service on fakes and fills the pool to `settings.depth`.
pub async fn harness(settings: PoolConfig) -> Harness {
    let mount_root = TempDir::new().unwrap();
    let mounts = Arc::new(MountManager::new(mount_root.path()));
    let provisioner = Arc::new(FakeProvisioner::new(mounts.clone()));
    let runner = Arc::new(ScriptedRunner::new(mounts.clone()));
    let projects = Arc::new(MemoryProjectStore::default());

    let depth = settings.depth;
    let state = Arc::new(AppState::assemble(
        provisioner.clone(),
        runner.clone(),
        projects.clone(),
        mounts.clone(),
        settings,
    ));
    assert_eq!(state.pool.fill_pool(depth).await, depth);

    Harness {
        state,
        provisioner,
        runner,
        projects,
        mounts,
        _mount_root: mount_root,
    }
}

/// Polls `condition` until it holds, for at most five seconds.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..250 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Serves the REST API on a random local port and returns its base URL.
pub async fn spawn_server(state: Arc<AppState>) -> String {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/api/v0", addr)
}
