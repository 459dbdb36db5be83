use crate::{Error, Result};
use reqwest::Client;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::debug;

/// HTTP client for the local model runner process that hosts the captioner and
/// the image generator.
///
/// The runner is a local resource, so every failure surfaces as
/// `Error::LocalBackend` and never feeds a fallback chain.
#[derive(Clone)]
pub struct RunnerClient {
    http: Client,
    base_url: String,
    backend: String,
}

#[derive(Debug, Serialize)]
struct LoadRequest<'a> {
    model: &'a str,
    task: &'a str,
}

impl RunnerClient {
    pub fn new(base_url: &str, timeout: Duration, backend: impl Into<String>) -> Result<Self> {
        let backend = backend.into();
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::local_backend(&backend, e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            backend,
        })
    }

    /// Asks the runner to bring `model` into memory for `task`.
    pub async fn load_model(&self, model: &str, task: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post_json("/models/load", &LoadRequest { model, task })
            .await?;
        Ok(())
    }

    pub async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Calling local runner: {}", url);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::local_backend(&self.backend, format!("runner unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::local_backend(
                &self.backend,
                format!("runner returned status {status}: {error_text}"),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| Error::local_backend(&self.backend, format!("bad runner response: {e}")))
    }
}
