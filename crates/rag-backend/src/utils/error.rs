use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::guardrails::trace::TraceContext;

/// Per-file issue reported by upload validation.
#[derive(Debug, Clone, Serialize)]
pub struct FileValidationIssue {
    pub filename: String,
    pub error: String,
}

/// Domain error surfaced at the HTTP boundary.
///
/// Every variant maps onto the global error envelope
/// `{error: {type, message, status_code, trace_id, timestamp, details}}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation { message: String, field: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    FileValidation {
        message: String,
        errors: Vec<FileValidationIssue>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{message}")]
    RateLimit {
        message: String,
        retry_after_seconds: u64,
    },

    #[error("{message}")]
    Timeout {
        message: String,
        timeout_seconds: u64,
        elapsed_ms: f64,
        stages_completed: u32,
    },

    #[error("{message}")]
    Provider {
        message: String,
        error_code: String,
        status_code: u16,
    },

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Database(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) | ApiError::FileValidation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            ApiError::Provider { status_code, .. } => {
                StatusCode::from_u16(*status_code).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
            }
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &str {
        match self {
            ApiError::Validation { .. } => "validation",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::FileValidation { .. } => "file_validation",
            ApiError::NotFound(_) => "not_found",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::RateLimit { .. } => "rate_limit",
            ApiError::Timeout { .. } => "timeout",
            ApiError::Provider { error_code, .. } => error_code,
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Database(_) => "database_error",
            ApiError::Internal(_) => "internal",
        }
    }

    fn details(&self) -> Value {
        match self {
            ApiError::Validation { field, .. } => json!({ "field": field }),
            ApiError::FileValidation { errors, .. } => json!({ "validation_errors": errors }),
            ApiError::RateLimit {
                retry_after_seconds,
                ..
            } => json!({ "retry_after_seconds": retry_after_seconds }),
            ApiError::Timeout {
                timeout_seconds,
                elapsed_ms,
                stages_completed,
                ..
            } => json!({
                "timeout_seconds": timeout_seconds,
                "elapsed_ms": elapsed_ms,
                "stages_completed": stages_completed,
            }),
            _ => json!({}),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let trace_id = TraceContext::current_trace_id();

        if status.is_server_error() {
            tracing::error!(
                error_type = self.error_type(),
                status = status.as_u16(),
                trace_id = %trace_id,
                "{self}"
            );
        } else {
            tracing::warn!(
                error_type = self.error_type(),
                status = status.as_u16(),
                trace_id = %trace_id,
                "{self}"
            );
        }

        let body = json!({
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
                "status_code": status.as_u16(),
                "trace_id": trace_id,
                "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                "details": self.details(),
            }
        });

        let mut response = (status, Json(body)).into_response();

        if let Ok(value) = header::HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert("x-trace-id", value);
        }
        if let ApiError::RateLimit {
            retry_after_seconds,
            ..
        } = &self
        {
            if let Ok(value) = header::HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_422_with_field() {
        let err = ApiError::Validation {
            message: "Query cannot be empty".into(),
            field: "query".into(),
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.error_type(), "validation");
        assert_eq!(err.details()["field"], "query");
    }

    #[test]
    fn rate_limit_maps_to_429() {
        let err = ApiError::RateLimit {
            message: "too many uploads".into(),
            retry_after_seconds: 120,
        };
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.details()["retry_after_seconds"], 120);
    }

    #[test]
    fn provider_error_preserves_status_and_code() {
        let err = ApiError::Provider {
            message: "upstream down".into(),
            error_code: "rate_limit".into(),
            status_code: 503,
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_type(), "rate_limit");
    }
}
