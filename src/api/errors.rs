// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::inference::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
    pub request_id: Option<String>,
    pub details: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone)]
pub enum ApiError {
    NotFound(String),
    InvalidRequest(String),
    MissingField(String),
    DecodeError(String),
    ServiceUnavailable(String),
    ClassificationFailed(String),
    InternalError(String),
}

impl ApiError {
    pub fn to_response(&self, request_id: Option<String>) -> ErrorResponse {
        let (error_type, message, details) = match self {
            ApiError::NotFound(msg) => ("not_found", msg.clone(), None),
            ApiError::InvalidRequest(msg) => ("invalid_request", msg.clone(), None),
            ApiError::MissingField(field) => {
                let mut details = HashMap::new();
                details.insert("field".to_string(), serde_json::Value::String(field.clone()));
                (
                    "validation_error",
                    format!("multipart field '{}' is required", field),
                    Some(details),
                )
            }
            ApiError::DecodeError(msg) => ("decode_error", msg.clone(), None),
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg.clone(), None),
            ApiError::ClassificationFailed(msg) => ("classification_error", msg.clone(), None),
            ApiError::InternalError(msg) => ("internal_error", msg.clone(), None),
        };

        ErrorResponse {
            error_type: error_type.to_string(),
            message,
            request_id,
            details,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::InvalidRequest(_) | ApiError::MissingField(_) | ApiError::DecodeError(_) => 400,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::ClassificationFailed(_) | ApiError::InternalError(_) => 500,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::MissingField(field) => write!(f, "Missing multipart field: {}", field),
            ApiError::DecodeError(msg) => write!(f, "Invalid image: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ApiError::ClassificationFailed(msg) => write!(f, "Classification failed: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match &e {
            PipelineError::Decode(inner) => ApiError::DecodeError(inner.to_string()),
            PipelineError::Configuration(_) => ApiError::ServiceUnavailable(e.to_string()),
            PipelineError::Detection(_) => ApiError::InternalError(e.to_string()),
            PipelineError::Classification(_) => ApiError::ClassificationFailed(e.to_string()),
        }
    }
}

/// An [`ApiError`] bound to the request it failed
#[derive(Debug)]
pub struct ApiErrorResponse {
    pub error: ApiError,
    pub request_id: Option<String>,
}

impl ApiErrorResponse {
    pub fn new(error: impl Into<ApiError>, request_id: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            request_id: Some(request_id.into()),
        }
    }
}

impl From<ApiError> for ApiErrorResponse {
    fn from(error: ApiError) -> Self {
        Self {
            error,
            request_id: None,
        }
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let error_response = self.error.to_response(self.request_id);

        (status, axum::response::Json(error_response)).into_response()
    }
}
