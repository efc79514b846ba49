use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::extract::language::LanguageDetector;
use crate::extract::normalize::TextNormalizer;
use crate::extract::ExtractionError;
use crate::models::document::{ExtractedDocument, ExtractedPage, FileFormat};

/// Tier 4: rasterize + OCR for scanned documents.
///
/// Invokes the configured OCR binary on a temp file under a wall-clock
/// timeout. Page breaks are form-feed characters in the OCR output.
pub struct OcrExtractor {
    cmd: String,
    dpi: u32,
    lang: String,
    timeout: Duration,
}

impl OcrExtractor {
    pub fn new(cmd: String, dpi: u32, lang: String, timeout_seconds: u64) -> Self {
        OcrExtractor {
            cmd,
            dpi,
            lang,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("ocr_{}.pdf", Uuid::new_v4()))
    }

    pub async fn extract_document(
        &self,
        content: &[u8],
        document_id: Uuid,
        filename: &str,
        language: Option<&str>,
    ) -> Result<ExtractedDocument, ExtractionError> {
        let start = Instant::now();
        let temp_file = Self::temp_path();

        tokio::fs::write(&temp_file, content).await.map_err(|err| {
            ExtractionError::new(
                filename,
                "ocr_failed",
                format!("Failed to stage OCR input: {err}"),
            )
        })?;

        let command_future = tokio::process::Command::new(&self.cmd)
            .arg(&temp_file)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("--dpi")
            .arg(self.dpi.to_string())
            .output();

        let output = match tokio::time::timeout(self.timeout, command_future).await {
            Ok(result) => result,
            Err(_) => {
                let _ = tokio::fs::remove_file(&temp_file).await;
                return Err(ExtractionError::new(
                    filename,
                    "timeout",
                    format!(
                        "OCR exceeded wall-clock timeout of {}s",
                        self.timeout.as_secs()
                    ),
                )
                .with_status(408));
            }
        };

        let _ = tokio::fs::remove_file(&temp_file).await;

        let output = output.map_err(|err| {
            ExtractionError::new(
                filename,
                "ocr_failed",
                format!("Failed to run OCR command '{}': {err}", self.cmd),
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::new(
                filename,
                "ocr_failed",
                format!("OCR command exited with {}: {stderr}", output.status),
            )
            .with_details(json!({ "cmd": self.cmd.clone() })));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        let mut page_texts: Vec<&str> = text.split('\u{0c}').collect();
        while page_texts.last().is_some_and(|t| t.trim().is_empty()) && page_texts.len() > 1 {
            page_texts.pop();
        }

        let mut pages: Vec<ExtractedPage> = Vec::with_capacity(page_texts.len());
        for (index, page_text) in page_texts.iter().enumerate() {
            let normalized_text = TextNormalizer::normalize(page_text);
            pages.push(ExtractedPage {
                page_number: index as u32,
                is_empty: TextNormalizer::is_empty_page(&normalized_text),
                word_count: normalized_text.split_whitespace().count(),
                char_count: normalized_text.chars().count(),
                line_count: page_text.lines().count(),
                language: None,
                section_title: None,
                // OCR output is inherently noisier than native text.
                confidence_score: 0.8,
                raw_text: (*page_text).to_string(),
                normalized_text,
            });
        }

        let full_text = pages
            .iter()
            .map(|p| p.normalized_text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let doc_language = language
            .map(str::to_owned)
            .unwrap_or_else(|| LanguageDetector::detect(&full_text));
        for page in &mut pages {
            page.language = Some(doc_language.clone());
        }

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut metadata = serde_json::Map::new();
        metadata.insert("ocr_cmd".into(), json!(self.cmd.clone()));
        metadata.insert("ocr_dpi".into(), json!(self.dpi));
        metadata.insert("ocr_lang".into(), json!(self.lang.clone()));

        Ok(ExtractedDocument {
            document_id,
            filename: filename.to_string(),
            format: FileFormat::Pdf,
            language: doc_language,
            total_pages: pages.len(),
            pages,
            extraction_metadata: metadata,
            extraction_duration_ms: duration_ms,
            created_at: Utc::now(),
        })
    }
}
