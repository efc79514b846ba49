use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::extract::language::LanguageDetector;
use crate::extract::normalize::TextNormalizer;
use crate::extract::ExtractionError;
use crate::models::document::{ExtractedDocument, ExtractedPage, FileFormat};

#[derive(Debug, Deserialize)]
struct RemotePage {
    page_number: Option<u32>,
    text: String,
}

#[derive(Debug, Deserialize)]
struct RemoteParseResponse {
    pages: Vec<RemotePage>,
}

/// Tier 3: external AI extraction service for premium documents.
///
/// The service is a black box: PDF bytes in, per-page text out.
pub struct RemoteParseExtractor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RemoteParseExtractor {
    pub fn new(base_url: String, api_key: String, timeout_seconds: u64) -> Self {
        RemoteParseExtractor {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_seconds))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url,
            api_key,
        }
    }

    pub async fn extract_document(
        &self,
        content: &[u8],
        document_id: Uuid,
        filename: &str,
        language: Option<&str>,
    ) -> Result<ExtractedDocument, ExtractionError> {
        let start = Instant::now();

        let url = format!("{}/v1/parse", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .query(&[("filename", filename)])
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/pdf")
            .body(content.to_vec())
            .send()
            .await
            .map_err(|err| {
                let error_type = if err.is_timeout() {
                    "timeout"
                } else {
                    "remote_parse_failed"
                };
                ExtractionError::new(
                    filename,
                    error_type,
                    format!("Remote parse request failed: {err}"),
                )
                .with_status(if err.is_timeout() { 408 } else { 502 })
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::new(
                filename,
                "remote_parse_failed",
                format!("Remote parse service returned {status}: {body}"),
            )
            .with_status(502));
        }

        let parsed: RemoteParseResponse = response.json().await.map_err(|err| {
            ExtractionError::new(
                filename,
                "remote_parse_failed",
                format!("Invalid remote parse payload: {err}"),
            )
            .with_status(502)
        })?;

        let mut pages: Vec<ExtractedPage> = Vec::with_capacity(parsed.pages.len());
        for (index, remote) in parsed.pages.into_iter().enumerate() {
            let normalized_text = TextNormalizer::normalize(&remote.text);
            pages.push(ExtractedPage {
                page_number: remote.page_number.unwrap_or(index as u32),
                is_empty: TextNormalizer::is_empty_page(&normalized_text),
                word_count: normalized_text.split_whitespace().count(),
                char_count: normalized_text.chars().count(),
                line_count: remote.text.lines().count(),
                language: None,
                section_title: None,
                confidence_score: 1.0,
                raw_text: remote.text,
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
        metadata.insert("parse_service".into(), json!(self.base_url.clone()));

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
