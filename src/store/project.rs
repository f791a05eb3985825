use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{download_entries, walk_meta, StoreError, VersionStore};
use crate::artifact::{Artifact, ArtifactMatcher};

/// Durable project state as seen by the sandbox layer.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Current source files (everything that is not compiled output).
    async fn load_sources(&self, project: Uuid) -> Result<Vec<Artifact>, StoreError>;

    /// Output of the last successful compile. Empty when there is none.
    async fn load_compiled_artifacts(&self, project: Uuid) -> Result<Vec<Artifact>, StoreError>;

    /// Saves compile output and returns it with the shas the store assigned.
    async fn persist_compiled_artifacts(
        &self,
        project: Uuid,
        artifacts: &[Artifact],
    ) -> Result<Vec<Artifact>, StoreError>;
}

/// Keeps compiled output next to the sources in the project's repository.
pub struct VcsProjectStore {
    store: Arc<dyn VersionStore>,
    matcher: ArtifactMatcher,
}

impl VcsProjectStore {
    pub fn new(store: Arc<dyn VersionStore>, matcher: ArtifactMatcher) -> Self {
        Self { store, matcher }
    }
}

#[async_trait]
impl ProjectStore for VcsProjectStore {
    async fn load_sources(&self, project: Uuid) -> Result<Vec<Artifact>, StoreError> {
        let entries = walk_meta(self.store.as_ref(), project)
            .await?
            .into_iter()
            .filter(|entry| !self.matcher.is_compiled(&entry.path))
            .collect();
        download_entries(self.store.as_ref(), entries).await
    }

    async fn load_compiled_artifacts(&self, project: Uuid) -> Result<Vec<Artifact>, StoreError> {
        let entries: Vec<_> = walk_meta(self.store.as_ref(), project)
            .await?
            .into_iter()
            .filter(|entry| self.matcher.is_compiled(&entry.path))
            .collect();
        debug!("Project {} has {} compiled artifact(s)", project, entries.len());
        download_entries(self.store.as_ref(), entries).await
    }

    async fn persist_compiled_artifacts(
        &self,
        project: Uuid,
        artifacts: &[Artifact],
    ) -> Result<Vec<Artifact>, StoreError> {
        let existing: HashMap<String, String> = walk_meta(self.store.as_ref(), project)
            .await?
            .into_iter()
            .map(|entry| (entry.path.trim_start_matches('/').to_string(), entry.sha))
            .collect();

        let mut saved = Vec::with_capacity(artifacts.len());
        let mut written = 0usize;
        for artifact in artifacts {
            let path = artifact.path.trim_start_matches('/');
            let prior = existing.get(path).map(String::as_str);

            // Identical blob already stored
            if prior == Some(artifact.sha.as_str()) {
                saved.push(artifact.clone());
                continue;
            }

            let sha = self
                .store
                .update_file(project, path, &artifact.content, prior)
                .await?;
            written += 1;
            saved.push(Artifact {
                path: path.to_string(),
                content: artifact.content.clone(),
                sha,
            });
        }

        info!(
            "Persisted {} compiled artifact(s) for project {} ({} unchanged)",
            written,
            project,
            artifacts.len() - written
        );
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::git_blob_sha;
    use crate::store::MetaEntry;
    use std::sync::Mutex;

    /// Flat in-memory repository keyed by (project, path).
    #[derive(Default)]
    struct MemoryStore {
        files: Mutex<HashMap<(Uuid, String), Vec<u8>>>,
        writes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VersionStore for MemoryStore {
        async fn load_meta(&self, project: Uuid, _path: &str) -> Result<Vec<MetaEntry>, StoreError> {
            let files = self.files.lock().unwrap();
            Ok(files
                .iter()
                .filter(|((p, _), _)| *p == project)
                .map(|((_, path), content)| MetaEntry {
                    is_dir: false,
                    path: path.clone(),
                    sha: git_blob_sha(content),
                    download_url: Some(format!("{}/{}", project, path)),
                })
                .collect())
        }

        async fn download_file(&self, locator: &str) -> Result<Vec<u8>, StoreError> {
            let (project, path) = locator.split_once('/').unwrap();
            self.files
                .lock()
                .unwrap()
                .get(&(project.parse().unwrap(), path.to_string()))
                .cloned()
                .ok_or_else(|| StoreError::NotFound(locator.to_string()))
        }

        async fn update_file(
            &self,
            project: Uuid,
            path: &str,
            content: &[u8],
            prior_sha: Option<&str>,
        ) -> Result<String, StoreError> {
            let mut files = self.files.lock().unwrap();
            let key = (project, path.to_string());
            let current = files.get(&key).map(|c| git_blob_sha(c));
            if current.as_deref() != prior_sha {
                return Err(StoreError::Conflict { path: path.to_string() });
            }
            files.insert(key, content.to_vec());
            self.writes.lock().unwrap().push(path.to_string());
            Ok(git_blob_sha(content))
        }
    }

    fn seeded(project: Uuid, files: &[(&str, &[u8])]) -> Arc<MemoryStore> {
        let store = MemoryStore::default();
        for (path, content) in files {
            store
                .files
                .lock()
                .unwrap()
                .insert((project, path.to_string()), content.to_vec());
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn splits_sources_from_compiled_output() {
        let project = Uuid::new_v4();
        let store = seeded(project, &[("Main.java", b"src"), ("Main.class", b"bin")]);
        let projects = VcsProjectStore::new(store, ArtifactMatcher::default());

        let sources = projects.load_sources(project).await.unwrap();
        let compiled = projects.load_compiled_artifacts(project).await.unwrap();

        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].path, "Main.java");
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].path, "Main.class");
    }

    #[tokio::test]
    async fn no_compiled_output_yields_empty_list() {
        let project = Uuid::new_v4();
        let store = seeded(project, &[("Main.java", b"src")]);
        let projects = VcsProjectStore::new(store, ArtifactMatcher::default());

        assert!(projects.load_compiled_artifacts(project).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persist_overwrites_with_prior_sha_and_skips_identical_blobs() {
        let project = Uuid::new_v4();
        let store = seeded(project, &[("Main.class", b"old"), ("Util.class", b"same")]);
        let projects = VcsProjectStore::new(store.clone(), ArtifactMatcher::default());

        let output = vec![
            Artifact::new("Main.class", b"new".to_vec()),
            Artifact::new("Util.class", b"same".to_vec()),
            Artifact::new("/Extra.class", b"extra".to_vec()),
        ];
        let saved = projects.persist_compiled_artifacts(project, &output).await.unwrap();

        let mut writes = store.writes.lock().unwrap().clone();
        writes.sort();
        assert_eq!(writes, vec!["Extra.class", "Main.class"]);
        assert_eq!(saved[0].sha, git_blob_sha(b"new"));
        assert_eq!(saved[2].path, "Extra.class");
    }
}
