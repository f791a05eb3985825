use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::pool::ContainerId;

const INPUT_DIR: &str = "input";
const OUTPUT_DIR: &str = "output";

#[derive(Error, Debug)]
pub enum MountError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid artifact path: {0}")]
    InvalidPath(String),

    #[error("No mount for container {0}")]
    Missing(ContainerId),
}

/// Host directories bind-mounted into each sandbox at `/workspace`.
///
/// Every container gets its own `<base>/<container_uuid>` tree with an
/// `input/` directory the binder stages into and an `output/` directory the
/// sandbox writes its results to.
pub struct MountManager {
    base_path: PathBuf,
}

impl MountManager {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn mount_path(&self, id: ContainerId) -> PathBuf {
        self.base_path.join(id.to_string())
    }

    pub async fn create(&self, id: ContainerId) -> Result<PathBuf, MountError> {
        let mount_path = self.mount_path(id);
        tokio::fs::create_dir_all(mount_path.join(INPUT_DIR)).await?;
        tokio::fs::create_dir_all(mount_path.join(OUTPUT_DIR)).await?;

        debug!("Created mount for container {} at {:?}", id, mount_path);
        Ok(mount_path)
    }

    pub async fn remove(&self, id: ContainerId) -> Result<(), MountError> {
        let mount_path = self.mount_path(id);

        if tokio::fs::try_exists(&mount_path).await? {
            tokio::fs::remove_dir_all(&mount_path).await?;
            debug!("Removed mount for container {} at {:?}", id, mount_path);
        } else {
            warn!("Mount for container {} not found at {:?}", id, mount_path);
        }

        Ok(())
    }

    /// Writes `artifacts` below the container's `input/` directory.
    pub async fn stage(&self, id: ContainerId, artifacts: &[Artifact]) -> Result<usize, MountError> {
        let input = self.mount_path(id).join(INPUT_DIR);
        if !tokio::fs::try_exists(&input).await? {
            return Err(MountError::Missing(id));
        }

        for artifact in artifacts {
            let target = input.join(relative_path(&artifact.path)?);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, &artifact.content).await?;
        }

        info!("Staged {} file(s) into container {}", artifacts.len(), id);
        Ok(artifacts.len())
    }

    /// Files currently staged for the container.
    pub async fn staged(&self, id: ContainerId) -> Result<Vec<Artifact>, MountError> {
        read_tree(&self.mount_path(id).join(INPUT_DIR)).await
    }

    /// Files the sandbox produced in `output/`.
    pub async fn collect_output(&self, id: ContainerId) -> Result<Vec<Artifact>, MountError> {
        let output = self.mount_path(id).join(OUTPUT_DIR);
        if !tokio::fs::try_exists(&output).await? {
            return Err(MountError::Missing(id));
        }
        read_tree(&output).await
    }

    /// Mount directories currently on disk, keyed by the container they belong to.
    pub async fn list(&self) -> Result<Vec<ContainerId>, MountError> {
        let mut ids = Vec::new();
        if !tokio::fs::try_exists(&self.base_path).await? {
            return Ok(ids);
        }

        let mut entries = tokio::fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = entry.file_name().to_str().and_then(|name| name.parse().ok()) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

/// Rejects absolute paths and parent components so artifacts cannot escape
/// the mount.
fn relative_path(path: &str) -> Result<PathBuf, MountError> {
    let trimmed = path.trim_start_matches('/');
    let mut relative = PathBuf::new();

    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return Err(MountError::InvalidPath(path.to_string())),
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(MountError::InvalidPath(path.to_string()));
    }
    Ok(relative)
}

async fn read_tree(root: &Path) -> Result<Vec<Artifact>, MountError> {
    let mut artifacts = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let content = tokio::fs::read(&path).await?;
                let relative = path
                    .strip_prefix(root)
                    .map_err(|_| MountError::InvalidPath(path.display().to_string()))?;
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                artifacts.push(Artifact::new(relative, content));
            }
        }
    }

    artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(artifacts)
}
