use axum::http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{backend} returned status {status}: {message}")]
    Upstream {
        backend: String,
        status: u16,
        message: String,
    },

    #[error("Failed to reach {backend}: {message}")]
    Transport { backend: String, message: String },

    #[error("Invalid response from {backend}: {message}")]
    InvalidResponse { backend: String, message: String },

    #[error("Local backend {backend} failed: {message}")]
    LocalBackend { backend: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("OpenAI error: {0}")]
    OpenAi(#[from] async_openai::error::OpenAIError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn upstream(backend: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            backend: backend.into(),
            status,
            message: message.into(),
        }
    }

    pub fn transport(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn invalid_response(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn local_backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LocalBackend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Converts a reqwest failure into a transport error, keeping timeouts explicit.
    pub fn from_reqwest(backend: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::transport(backend, format!("request timed out: {err}"))
        } else {
            Self::transport(backend, err.to_string())
        }
    }

    /// Whether a remote failure should hand the request to the next backend in a chain.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            Self::Upstream { .. }
                | Self::Transport { .. }
                | Self::InvalidResponse { .. }
                | Self::Network(_)
                | Self::OpenAi(_)
        )
    }

    /// 5xx responses are the only failures worth retrying against the same backend.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Upstream { status, .. } if *status >= 500)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Base64(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { .. }
            | Self::Transport { .. }
            | Self::InvalidResponse { .. }
            | Self::Network(_)
            | Self::OpenAi(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
