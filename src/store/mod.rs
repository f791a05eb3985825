mod gitea;
mod project;

pub use gitea::{GiteaConfig, GiteaStore};
pub use project::{ProjectStore, VcsProjectStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::artifact::Artifact;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Request to version store failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Version store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflicting update of {path}")]
    Conflict { path: String },

    #[error("Invalid file content: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("No download locator for {0}")]
    MissingLocator(String),
}

/// One child of a directory in the version store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub is_dir: bool,
    pub path: String,
    pub sha: String,
    pub download_url: Option<String>,
}

#[async_trait]
pub trait VersionStore: Send + Sync {
    async fn load_meta(&self, project: Uuid, path: &str) -> Result<Vec<MetaEntry>, StoreError>;

    async fn download_file(&self, locator: &str) -> Result<Vec<u8>, StoreError>;

    /// Optimistic write: `prior_sha` must match the stored blob, or be `None`
    /// when the file does not exist yet. Returns the new sha.
    async fn update_file(
        &self,
        project: Uuid,
        path: &str,
        content: &[u8],
        prior_sha: Option<&str>,
    ) -> Result<String, StoreError>;
}

/// Metadata of every file in the project, depth first.
pub async fn walk_meta(store: &dyn VersionStore, project: Uuid) -> Result<Vec<MetaEntry>, StoreError> {
    let mut files = Vec::new();
    let mut pending = vec![String::from("/")];

    while let Some(dir) = pending.pop() {
        for entry in store.load_meta(project, &dir).await? {
            if entry.is_dir {
                pending.push(format!("/{}/", entry.path.trim_matches('/')));
            } else {
                files.push(entry);
            }
        }
    }

    Ok(files)
}

/// Downloads every file of the project.
pub async fn load_all_files(store: &dyn VersionStore, project: Uuid) -> Result<Vec<Artifact>, StoreError> {
    let entries = walk_meta(store, project).await?;
    download_entries(store, entries).await
}

pub(crate) async fn download_entries(
    store: &dyn VersionStore,
    entries: Vec<MetaEntry>,
) -> Result<Vec<Artifact>, StoreError> {
    let mut artifacts = Vec::with_capacity(entries.len());
    for entry in entries {
        let locator = entry
            .download_url
            .as_deref()
            .ok_or_else(|| StoreError::MissingLocator(entry.path.clone()))?;
        let content = store.download_file(locator).await?;
        artifacts.push(Artifact {
            path: entry.path,
            content,
            sha: entry.sha,
        });
    }
    Ok(artifacts)
}
