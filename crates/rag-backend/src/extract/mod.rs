pub mod format;
pub mod language;
pub mod markdown;
pub mod normalize;
pub mod pdf;
pub mod text;

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::document::{ExtractedDocument, FileFormat};

pub use format::FormatDetector;
pub use markdown::MarkdownExtractor;
pub use normalize::TextNormalizer;
pub use text::TextExtractor;

/// Failure raised by any extractor.
///
/// `status_code` is advisory for the HTTP boundary; extraction failures
/// inside an ingestion job mark the job failed instead of propagating.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExtractionError {
    pub message: String,
    pub filename: String,
    pub error_type: String,
    pub details: Value,
    pub status_code: u16,
}

impl ExtractionError {
    pub fn new(filename: &str, error_type: &str, message: impl Into<String>) -> Self {
        ExtractionError {
            message: message.into(),
            filename: filename.to_string(),
            error_type: error_type.to_string(),
            details: Value::Null,
            status_code: 500,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Facade over format detection and the concrete extractors.
pub struct TextExtractionService {
    pdf_pipeline: pdf::PdfExtractionPipeline,
}

impl TextExtractionService {
    pub fn new(pdf_config: crate::config::PdfPipelineConfig) -> Self {
        TextExtractionService {
            pdf_pipeline: pdf::PdfExtractionPipeline::new(pdf_config),
        }
    }

    /// Detect format and extract into an `ExtractedDocument`.
    pub async fn extract(
        &self,
        filename: &str,
        content: &Bytes,
        document_id: Uuid,
    ) -> Result<ExtractedDocument, ExtractionError> {
        tracing::info!(filename, document_id = %document_id, "extraction_started");

        let format = FormatDetector::detect_format(filename, content)?;

        let document = match format {
            FileFormat::Pdf => {
                let result = self
                    .pdf_pipeline
                    .extract(content, document_id, filename, None, None)
                    .await?;
                result.document
            }
            FileFormat::Txt => TextExtractor::extract(content, document_id, filename),
            FileFormat::Markdown => MarkdownExtractor::extract(content, document_id, filename),
        };

        tracing::info!(
            filename,
            document_id = %document_id,
            format = %document.format,
            total_pages = document.total_pages,
            duration_ms = document.extraction_duration_ms,
            "extraction_completed"
        );

        Ok(document)
    }
}
