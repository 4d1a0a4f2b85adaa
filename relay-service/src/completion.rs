use bytes::Bytes;
use futures::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::OpenAiConfig;
use crate::error::{ServiceError, ServiceResult, UpstreamError};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// OpenAI-compatible chat completion client
pub struct CompletionClient {
    client: Client,
    config: OpenAiConfig,
}

impl CompletionClient {
    /// Create a new completion client.
    ///
    /// Only connecting is bounded by a timeout; a streamed answer may take as
    /// long as the upstream needs.
    pub fn new(config: OpenAiConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| {
                ServiceError::Upstream(UpstreamError::Connection {
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Check if the completion API is reachable
    pub async fn health_check(&self) -> bool {
        let url = self.endpoint("models");

        let mut request = self.client.get(&url).timeout(HEALTH_CHECK_TIMEOUT);
        if let Some(key) = self.config.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Completion API health check failed");
                false
            }
        }
    }

    /// Start a streamed completion for a single user prompt.
    ///
    /// Errors here happen before anything is relayed: a missing credential,
    /// an unreachable upstream or a non-success status. The returned stream
    /// is the raw `text/event-stream` body.
    pub async fn stream_completion(
        &self,
        prompt: String,
    ) -> ServiceResult<impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| ServiceError::Config {
                message: "OpenAI API key is not configured".to_string(),
            })?;

        let url = self.endpoint("chat/completions");
        let request = CompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: true,
        };

        debug!(model = %request.model, url = %url, "Opening completion stream");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| UpstreamError::Connection {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();

            return Err(ServiceError::Upstream(UpstreamError::Status {
                status,
                message: upstream_error_message(&body),
            }));
        }

        Ok(response.bytes_stream())
    }
}

/// Pull `error.message` out of an upstream error body, falling back to the
/// raw body.
fn upstream_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Body of `POST /chat/completions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}
