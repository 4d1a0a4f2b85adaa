mod prompt;

pub use prompt::build_prompt;

use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::completion::CompletionClient;
use crate::config::RelayConfig;
use crate::error::{ProcessingError, ServiceError, ServiceResult};
use crate::ingestion::{IngestionService, resolve_format};
use crate::relay::{RelayEvent, relay};

/// Relay events for one answer
pub type RelayStream = Pin<Box<dyn Stream<Item = RelayEvent> + Send>>;

/// A document attached to a question
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Main service coordinator
pub struct RelayService {
    pub config: Arc<RelayConfig>,
    pub completion: Arc<CompletionClient>,
    pub ingestion: Arc<IngestionService>,
}

impl RelayService {
    /// Create a new service instance
    pub fn new(config: RelayConfig) -> ServiceResult<Self> {
        info!(
            model = %config.openai.model,
            base_url = %config.openai.base_url,
            "Initializing relay service"
        );

        if config.openai.api_key.is_none() {
            warn!("No OpenAI API key configured; questions will fail until one is set");
        }

        let completion = Arc::new(CompletionClient::new(config.openai.clone())?);
        let ingestion = Arc::new(IngestionService::new(
            config.limits.clone(),
            config.storage.upload_dir.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            completion,
            ingestion,
        })
    }

    /// Answer a question, optionally about an attached document.
    ///
    /// Everything that can fail before the first byte of the answer (a
    /// missing question, a rejected or unreadable document, an upstream that
    /// refuses the request) is returned as an error. Failures after that end
    /// the returned stream with [`RelayEvent::Error`].
    pub async fn ask(&self, question: &str, upload: Option<Upload>) -> ServiceResult<RelayStream> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "Question is required.".to_string(),
            });
        }

        let document = match upload {
            Some(upload) => Some(self.extract_upload(upload).await?),
            None => None,
        };

        let prompt = build_prompt(question, document.as_deref());
        debug!(
            prompt_len = prompt.len(),
            with_document = document.is_some(),
            "Prompt built"
        );
        trace!(prompt = %prompt, "Full prompt");

        let upstream = self.completion.stream_completion(prompt).await?;
        Ok(Box::pin(relay(upstream)))
    }

    /// Turn an uploaded document into prompt text.
    pub async fn extract_upload(&self, upload: Upload) -> ServiceResult<String> {
        let max = self.config.limits.max_upload_size_bytes;
        if upload.data.len() as u64 > max {
            return Err(ProcessingError::FileTooLarge { max }.into());
        }

        let format = resolve_format(upload.content_type.as_deref(), upload.filename.as_deref())?;

        info!(
            filename = upload.filename.as_deref().unwrap_or("<unnamed>"),
            format = %format,
            bytes = upload.data.len(),
            "Extracting uploaded document"
        );

        let ingestion = Arc::clone(&self.ingestion);
        let result = tokio::task::spawn_blocking(move || {
            ingestion.extract_bytes(&upload.data, upload.filename.as_deref(), format)
        })
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Extraction task failed: {}", e),
        })?;

        match result {
            Ok(text) => {
                metrics::counter!("documents_extracted_total", "format" => format.name())
                    .increment(1);
                Ok(text)
            }
            Err(e) => {
                metrics::counter!("document_extraction_failures_total", "format" => format.name())
                    .increment(1);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(upload_dir: &std::path::Path) -> RelayService {
        let mut config = RelayConfig::default();
        config.storage.upload_dir = upload_dir.to_path_buf();
        config.limits.max_upload_size_bytes = 64;
        RelayService::new(config).unwrap()
    }

    fn upload(name: &str, content_type: &str, data: &'static [u8]) -> Upload {
        Upload {
            filename: Some(name.to_string()),
            content_type: Some(content_type.to_string()),
            data: Bytes::from_static(data),
        }
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        for question in ["", "   \n\t"] {
            match service.ask(question, None).await {
                Err(ServiceError::InvalidRequest { message }) => {
                    assert_eq!(message, "Question is required.")
                }
                Err(other) => panic!("expected invalid request, got {:?}", other),
                Ok(_) => panic!("blank question accepted"),
            }
        }
    }

    #[tokio::test]
    async fn test_extract_upload_text() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let text = service
            .extract_upload(upload("notes.txt", "text/plain", b"meeting at noon"))
            .await
            .unwrap();
        assert_eq!(text, "meeting at noon");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_extract_upload_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let result = service
            .extract_upload(upload("big.txt", "text/plain", &[b'a'; 65]))
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::Processing(ProcessingError::FileTooLarge { max: 64 }))
        ));
    }

    #[tokio::test]
    async fn test_extract_upload_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let result = service
            .extract_upload(upload("photo.png", "image/png", b"\x89PNG"))
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::Processing(ProcessingError::UnsupportedFormat { .. }))
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let result = service.ask("Hello?", None).await;
        assert!(matches!(result, Err(ServiceError::Config { .. })));
    }
}
