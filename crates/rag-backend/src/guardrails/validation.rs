use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::utils::error::ApiError;

/// Raised when a query request fails basic input guardrails.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub field: String,
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation {
            message: err.message,
            field: err.field,
        }
    }
}

/// Placeholder forbidden-content patterns; conservative so the wiring is in
/// place without over-filtering.
static FORBIDDEN_PATTERNS: Lazy<Vec<Regex>> =
    Lazy::new(|| vec![Regex::new(r"(?i)__FORBIDDEN__").expect("static pattern")]);

/// Input guardrails for the public query endpoints, enforced before the
/// expensive RAG pipeline runs.
pub struct InputValidator;

impl InputValidator {
    pub const MAX_QUERY_LENGTH: usize = 5000;
    pub const TOP_K_MIN: usize = 1;
    pub const TOP_K_MAX: usize = 100;

    pub fn validate_query_text(query: &str) -> Result<(), ValidationError> {
        if query.trim().is_empty() {
            return Err(ValidationError {
                message: "Query cannot be empty".to_string(),
                field: "query".to_string(),
            });
        }

        if query.chars().count() > Self::MAX_QUERY_LENGTH {
            return Err(ValidationError {
                message: format!(
                    "Query exceeds maximum length of {} characters",
                    Self::MAX_QUERY_LENGTH
                ),
                field: "query".to_string(),
            });
        }

        for pattern in FORBIDDEN_PATTERNS.iter() {
            if pattern.is_match(query) {
                return Err(ValidationError {
                    message: "Query contains forbidden content".to_string(),
                    field: "query".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn validate_top_k(top_k: usize) -> Result<(), ValidationError> {
        if !(Self::TOP_K_MIN..=Self::TOP_K_MAX).contains(&top_k) {
            return Err(ValidationError {
                message: format!(
                    "top_k must be between {} and {}",
                    Self::TOP_K_MIN,
                    Self::TOP_K_MAX
                ),
                field: "top_k".to_string(),
            });
        }
        Ok(())
    }

    pub fn validate_request(query: &str, top_k: usize) -> Result<(), ValidationError> {
        Self::validate_query_text(query)?;
        Self::validate_top_k(top_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_is_rejected() {
        let err = InputValidator::validate_query_text("").unwrap_err();
        assert_eq!(err.field, "query");

        let err = InputValidator::validate_query_text("   \n\t ").unwrap_err();
        assert_eq!(err.field, "query");
    }

    #[test]
    fn overlong_query_is_rejected() {
        let query = "x".repeat(5001);
        assert!(InputValidator::validate_query_text(&query).is_err());
        let query = "x".repeat(5000);
        assert!(InputValidator::validate_query_text(&query).is_ok());
    }

    #[test]
    fn forbidden_pattern_is_rejected() {
        assert!(InputValidator::validate_query_text("tell me __forbidden__ things").is_err());
    }

    #[test]
    fn top_k_bounds() {
        assert!(InputValidator::validate_top_k(0).is_err());
        assert!(InputValidator::validate_top_k(1).is_ok());
        assert!(InputValidator::validate_top_k(100).is_ok());
        assert!(InputValidator::validate_top_k(101).is_err());
    }
}
