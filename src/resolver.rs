use crate::{
    Error, Result,
    backend::{
        BackendResult, Captioner, ChatBackend, ImageGenerator, Judge, JudgeRequest, Judgement,
        LocalCaptioner, LocalImageGenerator, RemoteChatClient, RemoteJudgeClient,
        RemoteVisionClient, Source, VisionBackend,
    },
    config::Config,
    history::ConversationTurn,
    media::EncodedImage,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fixed instruction sent to the primary vision backend.
pub const DESCRIBE_INSTRUCTION: &str = "Describe this image concisely.";

#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    pub result: BackendResult<String>,
    /// Set whenever the local captioner produced the description.
    pub fallback_caption: Option<String>,
    pub judgement: Option<Judgement>,
}

/// Picks the backend for each capability and walks its fallback chain.
pub struct BackendResolver {
    vision: Arc<dyn VisionBackend>,
    captioner: Arc<dyn Captioner>,
    generator: Arc<dyn ImageGenerator>,
    chat: Arc<dyn ChatBackend>,
    judge: Option<Arc<dyn Judge>>,
}

impl BackendResolver {
    pub fn new(
        vision: Arc<dyn VisionBackend>,
        captioner: Arc<dyn Captioner>,
        generator: Arc<dyn ImageGenerator>,
        chat: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            vision,
            captioner,
            generator,
            chat,
            judge: None,
        }
    }

    pub fn with_judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let resolver = Self::new(
            Arc::new(RemoteVisionClient::new(config.vision.clone())?),
            Arc::new(LocalCaptioner::new(config.captioner.clone())?),
            Arc::new(LocalImageGenerator::new(config.image_gen.clone())?),
            Arc::new(RemoteChatClient::new(config.chat.clone())?),
        );

        if config.judge.base_url.is_some() {
            info!("Judge backend enabled with model {}", config.judge.model);
            Ok(resolver.with_judge(Arc::new(RemoteJudgeClient::new(config.judge.clone())?)))
        } else {
            Ok(resolver)
        }
    }

    pub fn judging_enabled(&self) -> bool {
        self.judge.is_some()
    }

    /// Primary vision model first, local captioner on any remote failure,
    /// then an optional judge pass that can never fail the request.
    pub async fn describe(&self, image: &EncodedImage, prompt: Option<&str>) -> Result<Description> {
        let instruction = match prompt.map(str::trim).filter(|p| !p.is_empty()) {
            Some(prompt) => format!("{DESCRIBE_INSTRUCTION}\n{prompt}"),
            None => DESCRIBE_INSTRUCTION.to_string(),
        };

        let (result, fallback_caption) = match self.vision.describe(image, &instruction).await {
            Ok(text) => {
                debug!("Primary vision backend answered");
                (BackendResult::new(text, Source::Primary), None)
            }
            Err(e) if e.is_fallback_eligible() => {
                warn!("Primary vision backend failed, falling back to captioner: {}", e);
                let caption = self.captioner.caption(image).await.map_err(|e| {
                    error!("Fallback captioner failed: {}", e);
                    e
                })?;
                (
                    BackendResult::new(caption.clone(), Source::Fallback),
                    Some(caption),
                )
            }
            Err(e) => {
                error!("Primary vision backend failed fatally: {}", e);
                return Err(e);
            }
        };

        let judgement = match &self.judge {
            Some(judge) => {
                let request = JudgeRequest {
                    description: result.content().clone(),
                    image_data_url: image.to_data_url(),
                    source: result.source(),
                };
                match judge.judge(&request).await {
                    Ok(judgement) => Some(judgement),
                    Err(e) => {
                        warn!("Judge unavailable, returning unjudged description: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        Ok(Description {
            result,
            fallback_caption,
            judgement,
        })
    }

    /// Text-to-image on the single local generator. Blank prompts never reach it.
    pub async fn generate(&self, prompt: &str) -> Result<BackendResult<EncodedImage>> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(Error::validation("Prompt must not be empty"));
        }

        let image = self.generator.generate(prompt).await.map_err(|e| {
            error!("Image generation failed: {}", e);
            e
        })?;
        Ok(BackendResult::new(image, Source::Diffusion))
    }

    /// Sends the dispatched history to the chat backend. No fallback exists.
    pub async fn chat(&self, turns: Vec<ConversationTurn>) -> Result<BackendResult<String>> {
        let reply = self.chat.complete(&turns).await.map_err(|e| {
            error!("Chat backend failed: {}", e);
            e
        })?;
        Ok(BackendResult::new(reply, Source::Chat))
    }
}
