//! Question endpoints.
//!
//! Both endpoints hand the question to [`RelayService::ask`] and stream the
//! answer back; they differ in how the question arrives and in the framing
//! of the answer.
//!
//! [`RelayService::ask`]: crate::service::RelayService::ask

use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{ProcessingError, ServiceError, ServiceResult};
use crate::relay::framing::OutputFormat;
use crate::service::Upload;

use super::AppState;

/// Body of `POST /api/ask`
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: Option<String>,
}

/// Answer a question as plain streamed text
pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    metrics::counter!("relay_requests_total", "endpoint" => "ask").increment(1);

    let result = async {
        let Json(request) = payload.map_err(|e| ServiceError::InvalidRequest {
            message: e.body_text(),
        })?;
        let question = request.question.unwrap_or_default();
        state.service.ask(&question, None).await
    }
    .await;

    let events = result.inspect_err(record_rejection)?;
    Ok(OutputFormat::PlainText.into_response(events))
}

/// Answer a question about an optional uploaded document as an event stream
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ServiceError> {
    metrics::counter!("relay_requests_total", "endpoint" => "upload").increment(1);

    let result = async {
        let multipart = multipart.map_err(|e| ServiceError::InvalidRequest {
            message: e.body_text(),
        })?;
        let (question, upload) = read_form(multipart, &state).await?;
        state
            .service
            .ask(&question.unwrap_or_default(), upload)
            .await
    }
    .await;

    let events = result.inspect_err(record_rejection)?;
    Ok(OutputFormat::EventStream.into_response(events))
}

fn record_rejection(error: &ServiceError) {
    metrics::counter!("relay_rejected_total", "reason" => error.error_code()).increment(1);
}

/// Read the `question` text field and the `document` (or `file`) file field.
///
/// A file field with no filename and no content is what browsers send for
/// an empty file input; it counts as no upload.
async fn read_form(
    mut multipart: Multipart,
    state: &AppState,
) -> ServiceResult<(Option<String>, Option<Upload>)> {
    let max = state.service.config.limits.max_upload_size_bytes;
    let mut question = None;
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "question" => {
                question = Some(field.text().await.map_err(|e| multipart_error(e, max))?);
            }
            "document" | "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|name| !name.is_empty());
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| multipart_error(e, max))?;

                if filename.is_none() && data.is_empty() {
                    continue;
                }
                upload = Some(Upload {
                    filename,
                    content_type,
                    data,
                });
            }
            _ => {}
        }
    }

    Ok((question, upload))
}

fn multipart_error(error: MultipartError, max: u64) -> ServiceError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ProcessingError::FileTooLarge { max }.into()
    } else {
        ServiceError::InvalidRequest {
            message: error.body_text(),
        }
    }
}
