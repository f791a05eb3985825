use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::pool::{ContainerId, Endpoint, Purpose};

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Request to sandbox failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Sandbox returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    pub exit_code: i64,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

impl RunOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Serialize)]
struct RunRequest {
    container_uuid: ContainerId,
}

/// Triggers the action inside a bound sandbox and waits for its outcome.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, id: ContainerId, endpoint: Endpoint, purpose: Purpose) -> Result<RunOutput, RunnerError>;
}

/// Talks to the agent listening inside each sandbox:
/// `POST http://{ip}:{port}/{purpose}`.
pub struct HttpRunner {
    client: reqwest::Client,
}

impl HttpRunner {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Runner for HttpRunner {
    async fn run(&self, id: ContainerId, endpoint: Endpoint, purpose: Purpose) -> Result<RunOutput, RunnerError> {
        let url = format!("http://{}/{}", endpoint, purpose.as_str());
        debug!("Starting {} in container {} at {}", purpose, id, url);

        let response = self
            .client
            .post(&url)
            .json(&RunRequest { container_uuid: id })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RunnerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<RunOutput>().await?)
    }
}
