use crate::backend::{Judgement, Source};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct DescribeResponse {
    pub description: String,
    pub description_source: Source,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blip_caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judgement: Option<Judgement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// `data:` URL of the generated image.
    pub image: String,
    pub prompt: String,
    pub source: Source,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatJsonRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub image_base64: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub message: Option<String>,
    pub image: Option<String>,
    pub source: Source,
    pub conversation_continued: bool,
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewChatResponse {
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub source: Source,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            source: Source::Error,
        }
    }
}
