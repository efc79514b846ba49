use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::extract::language::LanguageDetector;
use crate::extract::normalize::TextNormalizer;
use crate::models::document::{ExtractedDocument, ExtractedPage, FileFormat};

/// Extracts plain text files into page-structured documents.
pub struct TextExtractor;

impl TextExtractor {
    pub const LINES_PER_PAGE: usize = 50;

    /// Decode bytes as UTF-8 with a Latin-1 fallback. Single-byte decoding
    /// cannot fail, so every input yields text.
    fn decode(content: &[u8]) -> String {
        if let Ok(text) = std::str::from_utf8(content) {
            return text.to_string();
        }
        let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(content);
        decoded.into_owned()
    }

    /// Split content into pages of exactly `LINES_PER_PAGE` lines and
    /// normalize each page.
    pub fn extract(content: &[u8], document_id: Uuid, filename: &str) -> ExtractedDocument {
        let start = Instant::now();

        let decoded = Self::decode(content)
            .replace("\r\n", "\n")
            .replace('\r', "\n");
        let lines: Vec<&str> = decoded.split('\n').collect();

        let mut pages: Vec<ExtractedPage> = Vec::new();
        for (page_number, page_lines) in lines.chunks(Self::LINES_PER_PAGE).enumerate() {
            let raw_text = page_lines.join("\n");
            let normalized_text = TextNormalizer::normalize(&raw_text);

            pages.push(ExtractedPage {
                page_number: page_number as u32,
                is_empty: TextNormalizer::is_empty_page(&normalized_text),
                word_count: normalized_text.split_whitespace().count(),
                char_count: normalized_text.chars().count(),
                line_count: page_lines.len(),
                language: None,
                section_title: None,
                confidence_score: 1.0,
                raw_text,
                normalized_text,
            });
        }

        let full_text = pages
            .iter()
            .map(|p| p.normalized_text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let language = LanguageDetector::detect(if full_text.is_empty() {
            &decoded
        } else {
            &full_text
        });
        for page in &mut pages {
            page.language = Some(language.clone());
        }

        let total_words: usize = pages.iter().map(|p| p.word_count).sum();
        let total_chars: usize = pages.iter().map(|p| p.char_count).sum();
        let empty_pages = pages.iter().filter(|p| p.is_empty).count();
        let non_empty_pages = pages.len() - empty_pages;

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(
            filename,
            document_id = %document_id,
            total_pages = pages.len(),
            language = %language,
            duration_ms,
            "text_extraction_completed"
        );

        let mut metadata = serde_json::Map::new();
        metadata.insert("lines_per_page".into(), json!(Self::LINES_PER_PAGE));
        metadata.insert("total_words".into(), json!(total_words));
        metadata.insert("total_chars".into(), json!(total_chars));
        metadata.insert("empty_pages".into(), json!(empty_pages));
        metadata.insert("non_empty_pages".into(), json!(non_empty_pages));

        ExtractedDocument {
            document_id,
            filename: filename.to_string(),
            format: FileFormat::Txt,
            language,
            total_pages: pages.len(),
            pages,
            extraction_metadata: metadata,
            extraction_duration_ms: duration_ms,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_into_fifty_line_pages() {
        let content = (0..120)
            .map(|i| format!("line number {i} with words"))
            .collect::<Vec<_>>()
            .join("\n");
        let doc = TextExtractor::extract(content.as_bytes(), Uuid::new_v4(), "long.txt");

        assert_eq!(doc.total_pages, 3);
        assert_eq!(doc.pages[0].line_count, 50);
        assert_eq!(doc.pages[1].line_count, 50);
        assert_eq!(doc.pages[2].line_count, 20);
        assert!(doc.pages.iter().all(|p| !p.is_empty));
        assert_eq!(doc.format, FileFormat::Txt);
    }

    #[test]
    fn page_numbers_are_monotonic() {
        let content = "a b c\n".repeat(130);
        let doc = TextExtractor::extract(content.as_bytes(), Uuid::new_v4(), "pages.txt");
        for (i, page) in doc.pages.iter().enumerate() {
            assert_eq!(page.page_number, i as u32);
        }
    }

    #[test]
    fn tiny_file_yields_one_empty_flagged_page() {
        let doc = TextExtractor::extract(b"hello", Uuid::new_v4(), "hello.txt");
        assert_eq!(doc.total_pages, 1);
        // Fewer than three tokens: marked empty but text is preserved.
        assert!(doc.pages[0].is_empty);
        assert_eq!(doc.pages[0].normalized_text, "hello");
    }

    #[test]
    fn decodes_latin1_fallback() {
        // 0xE9 is 'é' in Latin-1 and invalid standalone UTF-8.
        let bytes = b"caf\xe9 au lait";
        let doc = TextExtractor::extract(bytes, Uuid::new_v4(), "latin.txt");
        assert!(doc.pages[0].normalized_text.contains("café"));
    }
}
