use super::{Judge, JudgeRequest, Judgement, vision::completion_content};
use crate::{Error, Result, config::JudgeConfig};
use async_openai::types::{
    ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
    ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, ImageUrlArgs,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

const BACKEND: &str = "judge";

const JUDGE_INSTRUCTIONS: &str = "You grade image descriptions. Compare the description with the \
image and reply with JSON only: {\"score\": <1-10>, \"feedback\": \"<one sentence>\"}.";

/// Remote scoring service reached through an OpenAI-compatible API.
pub struct RemoteJudgeClient {
    http: Client,
    config: JudgeConfig,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    score: Option<f32>,
    #[serde(default)]
    feedback: String,
}

impl RemoteJudgeClient {
    pub fn new(config: JudgeConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::transport(BACKEND, e.to_string()))?;

        Ok(Self { http, config })
    }

    fn endpoint(&self) -> Result<String> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .ok_or_else(|| Error::config("JUDGE_BASE_URL is not set"))?;
        Ok(format!("{}/chat/completions", base_url.trim_end_matches('/')))
    }

    fn build_request(&self, request: &JudgeRequest) -> Result<CreateChatCompletionRequest> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(ChatCompletionRequestSystemMessageContent::Text(
                JUDGE_INSTRUCTIONS.to_string(),
            ))
            .build()?;

        let text = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(format!(
                "Description (from the {} backend): {}",
                request.source, request.description
            ))
            .build()?;
        let picture = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(ImageUrlArgs::default().url(&request.image_data_url).build()?)
            .build()?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(vec![
                ChatCompletionRequestUserMessageContentPart::Text(text),
                ChatCompletionRequestUserMessageContentPart::ImageUrl(picture),
            ]))
            .build()?;

        Ok(CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages(vec![system.into(), user.into()])
            .temperature(0.0)
            .build()?)
    }

    async fn call_once(
        &self,
        url: &str,
        api_key: &str,
        body: &CreateChatCompletionRequest,
    ) -> Result<Judgement> {
        let response = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(BACKEND, e))?;

        let status = response.status();
        if !status.is_success() {
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

        Ok(parse_verdict(&content, &self.config.model))
    }
}

/// Reads `{"score", "feedback"}` from the judge's reply, tolerating code
/// fences. Anything unparseable becomes feedback without a score.
fn parse_verdict(content: &str, model: &str) -> Judgement {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match serde_json::from_str::<Verdict>(trimmed) {
        Ok(verdict) => Judgement {
            score: verdict.score.map(|s| s.clamp(1.0, 10.0)),
            feedback: verdict.feedback,
            model: model.to_string(),
        },
        Err(_) => Judgement {
            score: None,
            feedback: content.trim().to_string(),
            model: model.to_string(),
        },
    }
}

#[async_trait]
impl Judge for RemoteJudgeClient {
    async fn judge(&self, request: &JudgeRequest) -> Result<Judgement> {
        let url = self.endpoint()?;
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::config("JUDGE_API_KEY is not set"))?;
        let body = self.build_request(request)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.call_once(&url, api_key, &body).await {
                Ok(judgement) => {
                    debug!("Judge scored description on attempt {}", attempt);
                    return Ok(judgement);
                }
                Err(e) if e.is_server_error() && attempt < self.config.max_attempts => {
                    warn!(
                        "Judge attempt {} failed: {}, retrying in {:?}",
                        attempt,
                        e,
                        self.config.retry_delay()
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_verdict_json() {
        let judgement = parse_verdict(r#"{"score": 8, "feedback": "accurate"}"#, "m");
        assert_eq!(judgement.score, Some(8.0));
        assert_eq!(judgement.feedback, "accurate");
        assert_eq!(judgement.model, "m");
    }

    #[test]
    fn test_parse_verdict_fenced_and_clamped() {
        let judgement = parse_verdict("```json\n{\"score\": 14, \"feedback\": \"ok\"}\n```", "m");
        assert_eq!(judgement.score, Some(10.0));
    }

    #[test]
    fn test_parse_verdict_free_text() {
        let judgement = parse_verdict("Looks fine to me.", "m");
        assert_eq!(judgement.score, None);
        assert_eq!(judgement.feedback, "Looks fine to me.");
    }

    #[tokio::test]
    async fn test_missing_configuration_is_reported() {
        let client = RemoteJudgeClient::new(JudgeConfig::default()).unwrap();
        let request = JudgeRequest {
            description: "a cat".to_string(),
            image_data_url: "data:image/jpeg;base64,AQID".to_string(),
            source: crate::backend::Source::Primary,
        };

        let err = client.judge(&request).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("JUDGE_BASE_URL"));

        let client = RemoteJudgeClient::new(JudgeConfig {
            base_url: Some("http://judge.invalid/v1".to_string()),
            ..JudgeConfig::default()
        })
        .unwrap();
        let err = client.judge(&request).await.unwrap_err();
        assert!(err.to_string().contains("JUDGE_API_KEY"));
    }
}
