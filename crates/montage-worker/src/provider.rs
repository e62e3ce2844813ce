//! Generation provider boundary.
//!
//! The provider is the upstream oracle that turns a scene instruction into a
//! rendered clip. It can answer synchronously with a downloadable clip, or
//! accept the scene and defer; a deferred render surfaces to the caller as a
//! `pending:<reference>` result.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use montage_models::SceneInstruction;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provider rejected the scene: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

/// Outcome of asking the provider for one scene.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneRender {
    /// The clip is rendered and stored at this local path.
    Clip(PathBuf),
    /// The provider has not finished; the reference can be polled out of band.
    Deferred(String),
}

/// The content-generation oracle the worker consumes.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Render one scene into `work_dir`, or defer with a provider reference.
    async fn render_scene(
        &self,
        instruction: &SceneInstruction,
        style: Option<&str>,
        stock_query_hints: &[String],
        work_dir: &Path,
    ) -> ProviderResult<SceneRender>;
}

/// HTTP implementation of the provider contract.
pub struct HttpGenerationProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct SceneRequest<'a> {
    prompt: &'a str,
    duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'a str>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    stock_query_hints: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SceneResponse {
    status: String,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    render_id: Option<String>,
}

impl HttpGenerationProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Create from `GENERATION_API_URL` and `GENERATION_API_KEY`.
    pub fn from_env() -> ProviderResult<Self> {
        let base_url = std::env::var("GENERATION_API_URL")
            .map_err(|_| ProviderError::config("GENERATION_API_URL is not set"))?;
        let api_key = std::env::var("GENERATION_API_KEY")
            .map_err(|_| ProviderError::config("GENERATION_API_KEY is not set"))?;
        Self::new(base_url, api_key)
    }

    async fn download(&self, url: &str, dest: &Path) -> ProviderResult<()> {
        debug!("Downloading rendered scene from {}", url);
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn render_scene(
        &self,
        instruction: &SceneInstruction,
        style: Option<&str>,
        stock_query_hints: &[String],
        work_dir: &Path,
    ) -> ProviderResult<SceneRender> {
        let request = SceneRequest {
            prompt: &instruction.prompt,
            duration_secs: instruction.duration_secs,
            style,
            stock_query_hints,
        };

        let response: SceneResponse = self
            .client
            .post(format!("{}/v1/scenes", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.status.as_str() {
            "completed" => {
                let url = response
                    .video_url
                    .ok_or_else(|| ProviderError::rejected("completed scene without a video url"))?;
                let dest = work_dir.join(format!("scene_{:04}.mp4", instruction.scene_index));
                self.download(&url, &dest).await?;
                Ok(SceneRender::Clip(dest))
            }
            "queued" | "processing" => {
                let reference = response
                    .render_id
                    .ok_or_else(|| ProviderError::rejected("deferred scene without a render id"))?;
                Ok(SceneRender::Deferred(reference))
            }
            other => Err(ProviderError::rejected(format!(
                "unexpected scene status: {other}"
            ))),
        }
    }
}
