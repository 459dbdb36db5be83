use super::ChatBackend;
use crate::{
    Error, Result,
    config::ChatConfig,
    history::{ConversationTurn, Role},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

const BACKEND: &str = "chat";

/// Returned when the chat backend answers without the expected reply structure.
pub const NO_REPLY_PLACEHOLDER: &str = "No response generated.";

/// Remote conversational model speaking the `generateContent` wire format.
pub struct RemoteChatClient {
    http: Client,
    config: ChatConfig,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

fn parts_of(turn: &ConversationTurn) -> Vec<Part> {
    let mut parts = Vec::new();
    if let Some(text) = turn.content.text.as_ref().filter(|t| !t.trim().is_empty()) {
        parts.push(Part::Text { text: text.clone() });
    }
    if let Some(image) = &turn.content.image {
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: image.data.clone(),
            },
        });
    }
    parts
}

fn build_request(turns: &[ConversationTurn]) -> GenerateContentRequest {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for turn in turns {
        let parts = parts_of(turn);
        if parts.is_empty() {
            continue;
        }
        match turn.role {
            Role::System => system_parts.extend(parts),
            Role::User => contents.push(Content {
                role: Some("user"),
                parts,
            }),
            Role::Assistant => contents.push(Content {
                role: Some("model"),
                parts,
            }),
        }
    }

    GenerateContentRequest {
        system_instruction: (!system_parts.is_empty()).then_some(Content {
            role: None,
            parts: system_parts,
        }),
        contents,
    }
}

/// Pulls `candidates[0].content.parts[0].text` out of a reply body.
pub(crate) fn extract_reply(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl RemoteChatClient {
    pub fn new(config: ChatConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::transport(BACKEND, e.to_string()))?;

        Ok(Self { http, config })
    }
}

#[async_trait]
impl ChatBackend for RemoteChatClient {
    async fn complete(&self, turns: &[ConversationTurn]) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::config("CHAT_API_KEY is not set"))?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let request = build_request(turns);
        debug!(
            "Calling chat backend {} with {} turns",
            self.config.model,
            request.contents.len()
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::from_reqwest(BACKEND, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::from_reqwest(BACKEND, e))?;

        if !status.is_success() {
            return Err(Error::upstream(BACKEND, status.as_u16(), body));
        }

        Ok(extract_reply(&body).unwrap_or_else(|| {
            warn!("Chat backend reply had no candidate text");
            NO_REPLY_PLACEHOLDER.to_string()
        }))
    }
}
