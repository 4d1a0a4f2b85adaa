use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Completion API client errors
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Connection failed to completion API at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Completion request failed (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Completion stream interrupted: {0}")]
    Stream(String),
}

/// Document processing errors
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Unsupported file format: {format}")]
    UnsupportedFormat { format: String },

    #[error("No text could be extracted from {format} document")]
    EmptyDocument { format: String },

    #[error("Failed to extract {format} text: {message}")]
    Extraction { format: String, message: String },

    #[error("File too large (max {max} bytes)")]
    FileTooLarge { max: u64 },

    #[error("IO error")]
    Io(#[source] std::io::Error),
}

impl ProcessingError {
    pub fn extraction(format: impl Into<String>, message: impl ToString) -> Self {
        Self::Extraction {
            format: format.into(),
            message: message.to_string(),
        }
    }
}

/// API error response (matches Axum's built-in JsonRejection format)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    pub(crate) fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Processing(ProcessingError::UnsupportedFormat { .. }) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ServiceError::Processing(ProcessingError::FileTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Upstream(UpstreamError::Connection { .. }) => "upstream_connection",
            ServiceError::Upstream(UpstreamError::Status { .. }) => "upstream_status",
            ServiceError::Upstream(UpstreamError::Stream(_)) => "upstream_stream",
            ServiceError::Processing(ProcessingError::UnsupportedFormat { .. }) => {
                "unsupported_format"
            }
            ServiceError::Processing(ProcessingError::EmptyDocument { .. }) => "empty_document",
            ServiceError::Processing(ProcessingError::Extraction { .. }) => "extraction_error",
            ServiceError::Processing(ProcessingError::FileTooLarge { .. }) => "file_too_large",
            ServiceError::Processing(ProcessingError::Io(_)) => "io_error",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        if status.is_server_error() {
            error!(code = %code, error = %format_error_chain(&self), "Request failed");
        } else {
            warn!(code = %code, error = %self, "Request rejected");
        }

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Render an error together with its `source()` chain on one line.
pub fn format_error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let missing = ServiceError::InvalidRequest {
            message: "Question is required.".to_string(),
        };
        assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(missing.error_code(), "invalid_request");

        let unsupported = ServiceError::from(ProcessingError::UnsupportedFormat {
            format: "image/png".to_string(),
        });
        assert_eq!(
            unsupported.status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );

        let upstream = ServiceError::from(UpstreamError::Status {
            status: 401,
            message: "bad key".to_string(),
        });
        assert_eq!(upstream.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let broken = ServiceError::from(ProcessingError::extraction("pdf", "bad xref"));
        assert_eq!(broken.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_format_error_chain() {
        let err = ServiceError::from(ProcessingError::Io(std::io::Error::other("disk gone")));
        assert_eq!(
            format_error_chain(&err),
            "IO error: disk gone"
        );
    }
}
