use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Supported source document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Pdf,
    Txt,
    Markdown,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Pdf => "pdf",
            FileFormat::Txt => "txt",
            FileFormat::Markdown => "markdown",
        }
    }

    pub fn parse(value: &str) -> Option<FileFormat> {
        match value {
            "pdf" => Some(FileFormat::Pdf),
            "txt" => Some(FileFormat::Txt),
            "markdown" => Some(FileFormat::Markdown),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single page/section of an extracted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub page_number: u32,
    pub raw_text: String,
    pub normalized_text: String,
    pub is_empty: bool,
    pub word_count: usize,
    pub char_count: usize,
    pub line_count: usize,
    pub language: Option<String>,
    pub section_title: Option<String>,
    pub confidence_score: f32,
}

impl ExtractedPage {
    /// Page is valid if not empty and has a minimum amount of content.
    pub fn is_valid(&self) -> bool {
        !self.is_empty && self.char_count > 50
    }
}

/// Complete extracted document with all pages.
///
/// `document_id` matches the id produced by the upload layer so downstream
/// components can correlate back to the original file metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub document_id: Uuid,
    pub filename: String,
    pub format: FileFormat,
    pub language: String,
    pub total_pages: usize,
    pub pages: Vec<ExtractedPage>,
    /// Format-specific metadata (page sizes, frontmatter, tier info).
    pub extraction_metadata: Map<String, Value>,
    pub extraction_duration_ms: f64,
    pub created_at: DateTime<Utc>,
}
