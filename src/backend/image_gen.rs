use super::{ImageGenerator, LazyBackend, ModelLoader, RunnerClient};
use crate::{Error, Result, config::ImageGenConfig, media::EncodedImage};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

const BACKEND: &str = "image_gen";

pub struct ImageModelLoader {
    runner: RunnerClient,
    config: ImageGenConfig,
}

/// Handle to a text-to-image pipeline the runner has already loaded.
pub struct RunnerImageModel {
    runner: RunnerClient,
    config: ImageGenConfig,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    width: u32,
    height: u32,
    steps: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    /// Base64 encoded image bytes.
    image: String,
}

#[async_trait]
impl ModelLoader for ImageModelLoader {
    type Model = RunnerImageModel;

    fn name(&self) -> &str {
        BACKEND
    }

    async fn load(&self) -> Result<RunnerImageModel> {
        self.runner
            .load_model(&self.config.model, "text-to-image")
            .await?;

        Ok(RunnerImageModel {
            runner: self.runner.clone(),
            config: self.config.clone(),
        })
    }
}

impl RunnerImageModel {
    pub async fn generate(&self, prompt: &str) -> Result<EncodedImage> {
        let started = Instant::now();
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            width: self.config.width,
            height: self.config.height,
            steps: self.config.steps,
        };

        let response: GenerateResponse = self.runner.post_json("/generate", &request).await?;
        let bytes = BASE64
            .decode(response.image.trim())
            .map_err(|e| Error::local_backend(BACKEND, format!("image is not base64: {e}")))?;
        let format = image::guess_format(&bytes)
            .map_err(|e| Error::local_backend(BACKEND, format!("unrecognised image: {e}")))?;

        info!(
            "Generated {}x{} image in {:?}",
            self.config.width,
            self.config.height,
            started.elapsed()
        );
        Ok(EncodedImage::new(format.to_mime_type(), bytes))
    }
}

pub struct LocalImageGenerator {
    backend: LazyBackend<ImageModelLoader>,
}

impl LocalImageGenerator {
    pub fn new(config: ImageGenConfig) -> Result<Self> {
        let runner = RunnerClient::new(&config.runner_url, config.timeout(), BACKEND)?;
        Ok(Self {
            backend: LazyBackend::new(ImageModelLoader { runner, config }),
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.is_loaded()
    }
}

#[async_trait]
impl ImageGenerator for LocalImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<EncodedImage> {
        self.backend.get().await?.generate(prompt).await
    }
}
