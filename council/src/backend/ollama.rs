//! Ollama HTTP backend
//!
//! Speaks the non-streaming `/api/generate` protocol:
//! request `{model, prompt, stream: false}`, reply `{response, ...}`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{compose_prompt, Backend};
use crate::config::BackendConfig;

/// Error type for a single generation request
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response parse error: {0}")]
    ParseError(String),
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Backend bound to one model on an Ollama-compatible service
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a backend with its own HTTP client
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Client(e.to_string()))?;
        Ok(Self::with_client(base_url, model, client))
    }

    /// Create a backend sharing an existing HTTP client
    pub fn with_client(
        base_url: impl Into<String>,
        model: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        }
    }

    /// One backend per configured model, all sharing a single client
    pub fn from_config(config: &BackendConfig) -> Result<Vec<Self>, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| BackendError::Client(e.to_string()))?;
        Ok(config
            .models
            .iter()
            .map(|model| Self::with_client(&config.base_url, model, client.clone()))
            .collect())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    /// Issue one request, surfacing every failure as an error
    pub async fn request(&self, full_prompt: &str) -> Result<String, BackendError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt: full_prompt,
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))?;

        Ok(parsed.response.trim().to_string())
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, context: &str) -> String {
        let full_prompt = compose_prompt(prompt, context);
        let start = Instant::now();

        match self.request(&full_prompt).await {
            Ok(text) => {
                debug!(
                    model = %self.model,
                    chars = text.len(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Generation complete"
                );
                text
            }
            Err(e) => {
                warn!(model = %self.model, "Generation failed: {}", e);
                String::new()
            }
        }
    }
}
