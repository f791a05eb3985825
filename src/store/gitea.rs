use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{MetaEntry, StoreError, VersionStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiteaConfig {
    /// Base URL the service reaches the store on, e.g. `http://gitea:3000`.
    pub base_url: String,
    /// Base URL the store puts into `download_url` when it differs from
    /// `base_url` (the store only knows its public name).
    pub public_url: Option<String>,
    /// Account owning one repository per project.
    pub owner: String,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    path: String,
    sha: String,
    #[serde(rename = "type")]
    kind: String,
    download_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct WriteFileRequest<'a> {
    content: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct WriteFileResponse {
    content: WrittenContent,
}

#[derive(Debug, Deserialize)]
struct WrittenContent {
    sha: String,
}

/// Version store backed by the Gitea contents API, one repository per project.
pub struct GiteaStore {
    client: reqwest::Client,
    config: GiteaConfig,
}

impl GiteaStore {
    pub fn new(config: GiteaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn contents_url(&self, project: Uuid, path: &str) -> String {
        let base = format!(
            "{}/api/v1/repos/{}/{}/contents",
            self.config.base_url.trim_end_matches('/'),
            self.config.owner,
            project
        );
        let path = path.trim_matches('/');
        if path.is_empty() {
            base
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Points a `download_url` handed out by the store at `base_url`.
    pub fn rewrite_locator(&self, locator: &str) -> String {
        match &self.config.public_url {
            Some(public) => match locator.strip_prefix(public.trim_end_matches('/')) {
                Some(rest) => format!("{}{}", self.config.base_url.trim_end_matches('/'), rest),
                None => locator.to_string(),
            },
            None => locator.to_string(),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.header(reqwest::header::AUTHORIZATION, format!("token {}", token)),
            None => request,
        }
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::NOT_FOUND => Err(StoreError::NotFound(what.to_string())),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => Err(StoreError::Conflict {
            path: what.to_string(),
        }),
        _ => Err(StoreError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        }),
    }
}

#[async_trait]
impl VersionStore for GiteaStore {
    async fn load_meta(&self, project: Uuid, path: &str) -> Result<Vec<MetaEntry>, StoreError> {
        let url = self.contents_url(project, path);
        debug!("Listing {} of project {}", path, project);

        let response = self.authorized(self.client.get(&url)).send().await?;
        let entries: Vec<ContentsEntry> = check_status(response, path).await?.json().await?;

        Ok(entries
            .into_iter()
            .map(|entry| MetaEntry {
                is_dir: entry.kind == "dir",
                path: entry.path,
                sha: entry.sha,
                download_url: entry.download_url,
            })
            .collect())
    }

    async fn download_file(&self, locator: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.rewrite_locator(locator);
        let response = self.authorized(self.client.get(&url)).send().await?;
        let bytes = check_status(response, locator).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn update_file(
        &self,
        project: Uuid,
        path: &str,
        content: &[u8],
        prior_sha: Option<&str>,
    ) -> Result<String, StoreError> {
        let url = self.contents_url(project, path);
        let body = WriteFileRequest {
            content: STANDARD.encode(content),
            message: format!("Update {}", path.trim_matches('/')),
            sha: prior_sha,
        };

        let request = match prior_sha {
            Some(_) => self.client.put(&url),
            None => self.client.post(&url),
        };
        let response = self.authorized(request).json(&body).send().await?;
        let written: WriteFileResponse = check_status(response, path).await?.json().await?;

        info!("Wrote {} in project {} (sha {})", path, project, written.content.sha);
        Ok(written.content.sha)
    }
}
