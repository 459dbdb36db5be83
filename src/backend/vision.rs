use super::VisionBackend;
use crate::{Error, Result, config::VisionConfig, media::EncodedImage};
use async_openai::types::{
    ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ImageUrlArgs,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

const BACKEND: &str = "vision";

/// Primary describe backend: an OpenAI-compatible `/chat/completions`
/// endpoint serving a vision-language model (vLLM and friends).
pub struct RemoteVisionClient {
    http: Client,
    config: VisionConfig,
}

/// Reads `choices[0].message.content` from a chat completions body. Servers
/// vary in the other fields they send, so nothing else is required.
pub(crate) fn completion_content(backend: &str, body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::invalid_response(backend, format!("body is not JSON: {e}")))?;
    value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::invalid_response(backend, "response has no message content"))
}

impl RemoteVisionClient {
    pub fn new(config: VisionConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::transport(BACKEND, e.to_string()))?;

        Ok(Self { http, config })
    }

    #[allow(deprecated)]
    fn build_request(&self, image: &EncodedImage, instruction: &str) -> Result<CreateChatCompletionRequest> {
        let text = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(instruction)
            .build()?;
        let picture = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(ImageUrlArgs::default().url(image.to_data_url()).build()?)
            .build()?;

        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(vec![
                ChatCompletionRequestUserMessageContentPart::Text(text),
                ChatCompletionRequestUserMessageContentPart::ImageUrl(picture),
            ]))
            .build()?;

        Ok(CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages(vec![message.into()])
            .max_tokens(self.config.max_tokens)
            .temperature(self.config.temperature)
            .build()?)
    }
}

#[async_trait]
impl VisionBackend for RemoteVisionClient {
    async fn describe(&self, image: &EncodedImage, instruction: &str) -> Result<String> {
        let request = self.build_request(image, instruction)?;
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        debug!(
            "Calling vision backend {} with {} byte image",
            self.config.model,
            image.bytes.len()
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(BACKEND, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::upstream(BACKEND, status.as_u16(), error_text));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::from_reqwest(BACKEND, e))?;
        let content = completion_content(BACKEND, &body)?;

        if content.trim().is_empty() {
            return Err(Error::invalid_response(BACKEND, "message content is empty"));
        }

        Ok(content)
    }
}
