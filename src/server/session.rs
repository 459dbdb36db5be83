use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap, HeaderValue,
        header::{COOKIE, SET_COOKIE},
        request::Parts,
    },
    response::Response,
};
use std::convert::Infallible;
use tracing::debug;
use uuid::Uuid;

pub const SESSION_HEADER: &str = "x-session-id";
pub const SESSION_COOKIE: &str = "session_id";

/// Caller session, taken from the `x-session-id` header or the `session_id`
/// cookie. A fresh UUID is issued when neither carries a usable id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub is_new: bool,
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn from_cookies(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
}

impl Session {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let existing = headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .or_else(|| from_cookies(headers))
            .filter(|id| is_valid_id(id));

        match existing {
            Some(id) => Self { id, is_new: false },
            None => {
                let id = Uuid::new_v4().to_string();
                debug!("Issuing new session: {}", id);
                Self { id, is_new: true }
            }
        }
    }

    /// Adds the session cookie to `response` when the id was just issued.
    pub fn attach(&self, mut response: Response) -> Response {
        if self.is_new {
            let cookie = format!(
                "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
                self.id
            );
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(SET_COOKIE, value);
            }
        }
        response
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
