use super::session::Session;
use super::types::{
    ChatJsonRequest, ChatResponse, DescribeResponse, ErrorResponse, GenerateRequest,
    GenerateResponse, NewChatResponse,
};
use crate::{
    Error, Result,
    config::ImageConfig,
    history::{ConversationAccumulator, TurnContent, TurnImage},
    media::{self, EncodedImage},
    resolver::BackendResolver,
};
use axum::{
    extract::{
        FromRequest, Multipart, Request, State,
        multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::{Method, StatusCode, header::CONTENT_TYPE},
    response::{Html, IntoResponse, Json, Response},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<BackendResolver>,
    pub conversations: Arc<ConversationAccumulator>,
    pub image: ImageConfig,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(e: Error) -> ApiError {
    let status = e.status_code();
    if status.is_server_error() {
        error!("Request failed with {}: {}", status, e);
    } else {
        debug!("Request rejected with {}: {}", status, e);
    }
    (status, Json(ErrorResponse::new(e.to_string())))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Decoding and resizing are CPU bound, so they run off the async workers.
async fn prepare(raw: Vec<u8>, config: &ImageConfig) -> Result<EncodedImage> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || media::prepare_image(&raw, &config))
        .await
        .map_err(|e| Error::internal(format!("Image task failed: {e}")))?
}

struct DescribeForm {
    image: Option<Vec<u8>>,
    prompt: Option<String>,
    include_image: bool,
}

async fn read_describe_form(mut multipart: Multipart) -> Result<DescribeForm> {
    let mut form = DescribeForm {
        image: None,
        prompt: None,
        include_image: false,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" | "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::validation(e.body_text()))?;
                form.image = Some(bytes.to_vec());
            }
            "prompt" => {
                form.prompt = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| Error::validation(e.body_text()))?,
                );
            }
            "include_image" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::validation(e.body_text()))?;
                form.include_image = is_truthy(&value);
            }
            other => debug!("Ignoring multipart field: {}", other),
        }
    }

    Ok(form)
}

pub async fn describe(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Json<DescribeResponse>, ApiError> {
    let multipart = multipart.map_err(|rejection| {
        api_error(Error::validation(format!(
            "POST an image file under 'image': {}",
            rejection.body_text()
        )))
    })?;

    let form = read_describe_form(multipart).await.map_err(api_error)?;
    let raw = form
        .image
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| api_error(Error::validation("Missing image file")))?;

    info!("Received describe request ({} bytes)", raw.len());
    let image = prepare(raw, &state.image).await.map_err(api_error)?;

    let description = state
        .resolver
        .describe(&image, form.prompt.as_deref())
        .await
        .map_err(api_error)?;

    let source = description.result.source();
    info!("Describe answered by {}", source);

    Ok(Json(DescribeResponse {
        description: description.result.into_content(),
        description_source: source,
        source,
        blip_caption: description.fallback_caption,
        judgement: description.judgement,
        image: form.include_image.then(|| image.to_data_url()),
    }))
}

pub async fn generate(
    State(state): State<AppState>,
    request: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> std::result::Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = request.map_err(|rejection| {
        api_error(Error::validation(format!(
            "Expected a JSON body with a 'prompt' field: {}",
            rejection.body_text()
        )))
    })?;

    let prompt = request.prompt.unwrap_or_default().trim().to_string();
    info!("Received generate request for prompt: {}", prompt);

    let result = state.resolver.generate(&prompt).await.map_err(api_error)?;
    let source = result.source();

    Ok(Json(GenerateResponse {
        image: result.content().to_data_url(),
        prompt,
        source,
    }))
}

/// A chat message before it becomes a turn: trimmed text plus raw image bytes.
struct ChatInput {
    message: Option<String>,
    image: Option<Vec<u8>>,
}

async fn read_chat_multipart(mut multipart: Multipart) -> Result<ChatInput> {
    let mut input = ChatInput {
        message: None,
        image: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "message" => {
                input.message = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| Error::validation(e.body_text()))?,
                );
            }
            "image" | "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::validation(e.body_text()))?;
                if !bytes.is_empty() {
                    input.image = Some(bytes.to_vec());
                }
            }
            other => debug!("Ignoring multipart field: {}", other),
        }
    }

    Ok(input)
}

async fn read_chat_input(state: &AppState, request: Request) -> Result<ChatInput> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|rejection| Error::validation(rejection.body_text()))?;
        return read_chat_multipart(multipart).await;
    }

    let Json(body) = Json::<ChatJsonRequest>::from_request(request, state)
        .await
        .map_err(|rejection| Error::validation(rejection.body_text()))?;

    let image = match non_blank(body.image_base64) {
        Some(encoded) => Some(media::decode_base64_image(&encoded)?),
        None => None,
    };
    Ok(ChatInput {
        message: body.message,
        image,
    })
}

async fn chat_exchange(state: &AppState, session: &Session, request: Request) -> Result<ChatResponse> {
    let input = read_chat_input(state, request).await?;
    let message = non_blank(input.message);
    let image = match input.image {
        Some(raw) => Some(prepare(raw, &state.image).await?),
        None => None,
    };

    if message.is_none() && image.is_none() {
        return Err(Error::validation("Provide a message and/or an image"));
    }

    let mut content = TurnContent {
        text: message.clone(),
        image: None,
    };
    if let Some(image) = &image {
        content = content.with_image(TurnImage::from(image));
    }

    info!(
        "Received chat request for session {} (image: {})",
        session.id,
        image.is_some()
    );

    let resolver = state.resolver.clone();
    let exchange = state
        .conversations
        .exchange(&session.id, content, |turns| async move {
            resolver.chat(turns).await
        })
        .await?;

    let source = exchange.reply.source();
    Ok(ChatResponse {
        reply: exchange.reply.into_content(),
        message,
        image: image.map(|image| image.to_data_url()),
        source,
        conversation_continued: exchange.continued,
        session_id: session.id.clone(),
    })
}

pub async fn chat(State(state): State<AppState>, session: Session, request: Request) -> Response {
    let response = match chat_exchange(&state, &session, request).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => api_error(e).into_response(),
    };
    session.attach(response)
}

pub async fn new_chat(State(state): State<AppState>, session: Session) -> Response {
    let response = match state.conversations.reset(&session.id).await {
        Ok(()) => Json(NewChatResponse {
            message: "Started a new conversation.".to_string(),
            session_id: session.id.clone(),
        })
        .into_response(),
        Err(e) => api_error(e).into_response(),
    };
    session.attach(response)
}

pub async fn method_not_allowed(method: Method) -> ApiError {
    warn!("Rejected {} request", method);
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse::new(format!("Method {method} is not allowed here"))),
    )
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn ui() -> Html<&'static str> {
    Html(include_str!("../../static/ui.html"))
}
