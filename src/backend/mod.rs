//! Inference backends and the seams the resolver talks through.

mod captioner;
mod chat;
mod image_gen;
mod judge;
mod lazy;
mod runner;
mod vision;

pub use captioner::{CaptionModelLoader, LocalCaptioner, RunnerCaptionModel};
pub use chat::{NO_REPLY_PLACEHOLDER, RemoteChatClient};
pub use image_gen::{ImageModelLoader, LocalImageGenerator, RunnerImageModel};
pub use judge::RemoteJudgeClient;
pub use lazy::{LazyBackend, ModelLoader};
pub use runner::RunnerClient;
pub use vision::RemoteVisionClient;

use crate::{Result, history::ConversationTurn, media::EncodedImage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Names the backend that produced a piece of returned content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Remote vision-language model.
    Primary,
    /// Local captioner.
    Fallback,
    /// Local image generation model.
    Diffusion,
    /// Remote conversational model.
    Chat,
    Error,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Diffusion => "diffusion",
            Self::Chat => "chat",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content produced by exactly one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResult<T> {
    content: T,
    source: Source,
}

impl<T> BackendResult<T> {
    pub fn new(content: T, source: Source) -> Self {
        Self { content, source }
    }

    pub fn content(&self) -> &T {
        &self.content
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn into_content(self) -> T {
        self.content
    }
}

/// Second opinion on a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgement {
    /// 1-10 when the judge returned a parseable score.
    pub score: Option<f32>,
    pub feedback: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JudgeRequest {
    pub description: String,
    pub image_data_url: String,
    pub source: Source,
}

#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Returns the model's text verbatim. Any error is eligible for fallback.
    async fn describe(&self, image: &EncodedImage, instruction: &str) -> Result<String>;
}

#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, image: &EncodedImage) -> Result<String>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<EncodedImage>;
}

#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, request: &JudgeRequest) -> Result<Judgement>;
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `turns` is the full dispatched history, oldest first, ending with the new user turn.
    async fn complete(&self, turns: &[ConversationTurn]) -> Result<String>;
}
