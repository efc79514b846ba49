use std::time::Instant;

use chrono::Utc;
use lopdf::{content::Content, Document, Object, ObjectId};
use serde_json::json;
use uuid::Uuid;

use crate::extract::language::LanguageDetector;
use crate::extract::normalize::TextNormalizer;
use crate::extract::pdf::analysis::{detect_table_like_layout, is_encrypted, page_has_images};
use crate::extract::ExtractionError;
use crate::models::document::{ExtractedDocument, ExtractedPage, FileFormat};

const MIN_HEADING_FONT_SIZE: f32 = 14.0;
const MIN_CHARS_PER_PAGE: usize = 50;

fn as_f32(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

/// Candidate section title: the first same-line run of text shown with a
/// font size at or above the heading threshold, 3..=200 chars long.
fn section_title_candidate(doc: &Document, page_id: ObjectId) -> Option<String> {
    let content_data = doc.get_page_content(page_id).ok()?;
    let content = Content::decode(&content_data).ok()?;

    let mut font_size = 0.0f32;
    let mut run = String::new();
    let mut collecting = false;

    for op in &content.operations {
        match op.operator.as_str() {
            "Tf" => {
                if let Some(size) = op.operands.get(1).and_then(as_f32) {
                    font_size = size;
                }
                if collecting && font_size < MIN_HEADING_FONT_SIZE {
                    break;
                }
            }
            "Tj" | "'" | "\"" => {
                if font_size >= MIN_HEADING_FONT_SIZE {
                    if let Some(Object::String(bytes, _)) = op.operands.last() {
                        run.push_str(&String::from_utf8_lossy(bytes));
                        collecting = true;
                    }
                } else if collecting {
                    break;
                }
            }
            "TJ" => {
                if font_size >= MIN_HEADING_FONT_SIZE {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        for item in items {
                            if let Object::String(bytes, _) = item {
                                run.push_str(&String::from_utf8_lossy(bytes));
                            }
                        }
                        collecting = true;
                    }
                } else if collecting {
                    break;
                }
            }
            // A text-positioning op after the run started means the heading
            // line ended.
            "Td" | "TD" | "T*" | "Tm" | "ET" => {
                if collecting {
                    break;
                }
            }
            _ => {}
        }
    }

    let candidate = run.split_whitespace().collect::<Vec<_>>().join(" ");
    let length = candidate.chars().count();
    if (3..=200).contains(&length) {
        Some(candidate)
    } else {
        None
    }
}

pub(crate) fn load_document(
    content: &[u8],
    filename: &str,
    password: Option<&str>,
) -> Result<Document, ExtractionError> {
    let doc = Document::load_mem(content).map_err(|err| {
        ExtractionError::new(
            filename,
            "corrupt_file",
            format!("Failed to open PDF for extraction: {err}"),
        )
    })?;

    if is_encrypted(&doc) {
        return Err(match password {
            None => ExtractionError::new(
                filename,
                "encrypted_file",
                "PDF is encrypted and no password was provided",
            )
            .with_status(400),
            Some(_) => ExtractionError::new(
                filename,
                "invalid_password",
                "PDF password was rejected",
            )
            .with_status(400),
        });
    }

    Ok(doc)
}

/// Tier 1: fast native text extraction for searchable PDFs.
pub fn extract_document(
    content: &[u8],
    document_id: Uuid,
    filename: &str,
    language: Option<&str>,
    password: Option<&str>,
) -> Result<ExtractedDocument, ExtractionError> {
    let start = Instant::now();
    let doc = load_document(content, filename, password)?;

    let page_map = doc.get_pages();
    let mut pages: Vec<ExtractedPage> = Vec::with_capacity(page_map.len());
    let mut any_tables = false;
    let mut any_images = false;

    for (page_number, page_id) in &page_map {
        let raw_text = doc.extract_text(&[*page_number]).unwrap_or_default();
        let normalized_text = TextNormalizer::normalize(&raw_text);

        let has_tables = detect_table_like_layout(&raw_text);
        let has_images = page_has_images(&doc, *page_id);
        any_tables |= has_tables;
        any_images |= has_images;

        pages.push(ExtractedPage {
            // lopdf page numbers are 1-based; pages are exposed 0-based.
            page_number: page_number - 1,
            is_empty: TextNormalizer::is_empty_page(&normalized_text),
            word_count: normalized_text.split_whitespace().count(),
            char_count: normalized_text.chars().count(),
            line_count: raw_text.lines().count(),
            language: None,
            section_title: section_title_candidate(&doc, *page_id),
            confidence_score: if has_tables { 0.9 } else { 1.0 },
            raw_text,
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

    let total_words: usize = pages.iter().map(|p| p.word_count).sum();
    let total_chars: usize = pages.iter().map(|p| p.char_count).sum();
    let empty_pages = pages.iter().filter(|p| p.is_empty).count();
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    tracing::info!(
        filename,
        document_id = %document_id,
        total_pages = pages.len(),
        language = %doc_language,
        duration_ms,
        "pdf_extraction_completed"
    );

    let mut metadata = serde_json::Map::new();
    metadata.insert("min_chars_per_page".into(), json!(MIN_CHARS_PER_PAGE));
    metadata.insert("total_words".into(), json!(total_words));
    metadata.insert("total_chars".into(), json!(total_chars));
    metadata.insert("empty_pages".into(), json!(empty_pages));
    metadata.insert("non_empty_pages".into(), json!(pages.len() - empty_pages));
    metadata.insert("has_tables".into(), json!(any_tables));
    metadata.insert("has_images".into(), json!(any_images));

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_pdf_fails_with_corrupt_file() {
        let err =
            extract_document(b"not a pdf at all", Uuid::new_v4(), "bad.pdf", None, None)
                .unwrap_err();
        assert_eq!(err.error_type, "corrupt_file");
    }
}
