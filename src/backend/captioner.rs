use super::{Captioner, LazyBackend, ModelLoader, RunnerClient};
use crate::{Error, Result, config::CaptionerConfig, media::EncodedImage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const BACKEND: &str = "captioner";

pub struct CaptionModelLoader {
    runner: RunnerClient,
    config: CaptionerConfig,
}

/// Handle to a caption model the runner has already loaded.
pub struct RunnerCaptionModel {
    runner: RunnerClient,
    model: String,
    max_new_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CaptionRequest<'a> {
    model: &'a str,
    image: String,
    mime_type: &'a str,
    max_new_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CaptionResponse {
    caption: String,
}

#[async_trait]
impl ModelLoader for CaptionModelLoader {
    type Model = RunnerCaptionModel;

    fn name(&self) -> &str {
        BACKEND
    }

    async fn load(&self) -> Result<RunnerCaptionModel> {
        self.runner
            .load_model(&self.config.model, "image-to-text")
            .await?;

        Ok(RunnerCaptionModel {
            runner: self.runner.clone(),
            model: self.config.model.clone(),
            max_new_tokens: self.config.max_new_tokens,
        })
    }
}

impl RunnerCaptionModel {
    pub async fn caption(&self, image: &EncodedImage) -> Result<String> {
        let request = CaptionRequest {
            model: &self.model,
            image: image.to_base64(),
            mime_type: &image.mime_type,
            max_new_tokens: self.max_new_tokens,
        };

        let response: CaptionResponse = self.runner.post_json("/caption", &request).await?;
        let caption = response.caption.trim();
        if caption.is_empty() {
            return Err(Error::local_backend(BACKEND, "captioner returned an empty caption"));
        }

        debug!("Captioner produced {} characters", caption.len());
        Ok(caption.to_string())
    }
}

/// Fallback captioner: always local, loaded on first use.
pub struct LocalCaptioner {
    backend: LazyBackend<CaptionModelLoader>,
}

impl LocalCaptioner {
    pub fn new(config: CaptionerConfig) -> Result<Self> {
        let runner = RunnerClient::new(&config.runner_url, config.timeout(), BACKEND)?;
        Ok(Self {
            backend: LazyBackend::new(CaptionModelLoader { runner, config }),
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.is_loaded()
    }
}

#[async_trait]
impl Captioner for LocalCaptioner {
    async fn caption(&self, image: &EncodedImage) -> Result<String> {
        self.backend.get().await?.caption(image).await
    }
}
