use serde_json::json;

use crate::extract::ExtractionError;
use crate::models::document::FileFormat;

/// Detects file format from content signature and filename extension.
pub struct FormatDetector;

impl FormatDetector {
    fn detect_from_signature(content: &[u8]) -> Option<FileFormat> {
        if content.starts_with(b"%PDF") {
            return Some(FileFormat::Pdf);
        }
        None
    }

    fn detect_from_extension(filename: &str) -> Option<FileFormat> {
        let ext = filename.rsplit_once('.')?.1.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(FileFormat::Pdf),
            "txt" => Some(FileFormat::Txt),
            "md" => Some(FileFormat::Markdown),
            _ => None,
        }
    }

    /// Detect file format, preferring signature then extension.
    pub fn detect_format(filename: &str, content: &[u8]) -> Result<FileFormat, ExtractionError> {
        if let Some(format) = Self::detect_from_signature(content) {
            return Ok(format);
        }
        if let Some(format) = Self::detect_from_extension(filename) {
            return Ok(format);
        }

        tracing::error!(filename, "format_detection_failed");
        Err(ExtractionError {
            message: format!("Unsupported file format: {filename}"),
            filename: filename.to_string(),
            error_type: "unsupported_format".to_string(),
            details: json!({ "reason": "extension_not_supported" }),
            status_code: 400,
        })
    }
}
