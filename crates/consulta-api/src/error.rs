//! API error handling
//!
//! Every pipeline failure is turned into exactly one JSON `{ "error": ... }`
//! body here. Upstream error text is logged by the handler and never copied
//! into the response.
//!
//! Author: hephaex@gmail.com

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use consulta_core::{ConsultaError, PipelineStage};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable message
    #[schema(example = "Document search failed")]
    pub error: String,
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Config,
    Embedding,
    Store,
    Completion,
    Timeout(PipelineStage),
    Cancelled,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing message
    pub fn message(&self) -> String {
        match self {
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Config => "Service is not configured".to_string(),
            AppError::Embedding => "Embedding service request failed".to_string(),
            AppError::Store => "Document search failed".to_string(),
            AppError::Completion => "Completion service request failed".to_string(),
            AppError::Timeout(stage) => format!("{stage} timed out"),
            AppError::Cancelled => "Request cancelled".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<ConsultaError> for AppError {
    fn from(err: ConsultaError) -> Self {
        match err {
            ConsultaError::Validation(msg) => AppError::BadRequest(msg),
            ConsultaError::Config(_) => AppError::Config,
            ConsultaError::Embedding(_) => AppError::Embedding,
            ConsultaError::Store(_) => AppError::Store,
            ConsultaError::Completion(_) | ConsultaError::Format(_) => AppError::Completion,
            ConsultaError::Timeout { stage, .. } => AppError::Timeout(stage),
            ConsultaError::Cancelled { .. } => AppError::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_bad_request() {
        let err = AppError::from(ConsultaError::Validation("Question cannot be empty".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Question cannot be empty");
    }

    #[test]
    fn test_upstream_detail_is_not_echoed() {
        let raw = "Hugging Face returned 401: token hf_secret123 is invalid";
        let err = AppError::from(ConsultaError::Embedding(raw.into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message().contains("hf_secret123"));
    }

    #[test]
    fn test_format_error_is_a_completion_failure() {
        let err = AppError::from(ConsultaError::Format("No choices".into()));
        assert!(matches!(err, AppError::Completion));
    }

    #[test]
    fn test_timeout_names_stage() {
        let err = AppError::from(ConsultaError::Timeout {
            stage: PipelineStage::Searching,
            after_secs: 10,
        });
        assert_eq!(err.message(), "document search timed out");
    }
}
