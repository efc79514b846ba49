use std::time::Instant;

use chrono::Utc;
use lopdf::{content::Content, Document, Object};
use serde_json::json;
use uuid::Uuid;

use crate::extract::language::LanguageDetector;
use crate::extract::normalize::TextNormalizer;
use crate::extract::pdf::tier1::load_document;
use crate::extract::ExtractionError;
use crate::models::document::{ExtractedDocument, ExtractedPage, FileFormat};

/// Vertical distance within which two text runs count as the same line.
const LINE_BUCKET: f32 = 2.0;

fn as_f32(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

struct PositionedRun {
    x: f32,
    y: f32,
    text: String,
}

/// Collect text runs with their positions from the page content stream.
fn positioned_runs(doc: &Document, page_id: lopdf::ObjectId) -> Vec<PositionedRun> {
    let Ok(content_data) = doc.get_page_content(page_id) else {
        return Vec::new();
    };
    let Ok(content) = Content::decode(&content_data) else {
        return Vec::new();
    };

    let mut runs: Vec<PositionedRun> = Vec::new();
    let mut x = 0.0f32;
    let mut y = 0.0f32;
    let mut leading = 0.0f32;

    for op in &content.operations {
        match op.operator.as_str() {
            "BT" => {
                x = 0.0;
                y = 0.0;
            }
            "Tm" => {
                if op.operands.len() == 6 {
                    x = as_f32(&op.operands[4]).unwrap_or(x);
                    y = as_f32(&op.operands[5]).unwrap_or(y);
                }
            }
            "Td" => {
                x += as_f32(&op.operands[0]).unwrap_or(0.0);
                y += as_f32(&op.operands[1]).unwrap_or(0.0);
            }
            "TD" => {
                let ty = as_f32(&op.operands[1]).unwrap_or(0.0);
                x += as_f32(&op.operands[0]).unwrap_or(0.0);
                y += ty;
                leading = -ty;
            }
            "TL" => {
                leading = as_f32(&op.operands[0]).unwrap_or(leading);
            }
            "T*" => {
                y -= leading;
            }
            "Tj" | "'" | "\"" => {
                if let Some(Object::String(bytes, _)) = op.operands.last() {
                    let text = String::from_utf8_lossy(bytes).into_owned();
                    if !text.trim().is_empty() {
                        runs.push(PositionedRun { x, y, text });
                    }
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    let mut text = String::new();
                    for item in items {
                        if let Object::String(bytes, _) = item {
                            text.push_str(&String::from_utf8_lossy(bytes));
                        }
                    }
                    if !text.trim().is_empty() {
                        runs.push(PositionedRun { x, y, text });
                    }
                }
            }
            _ => {}
        }
    }

    runs
}

/// Re-assemble page text from positioned runs: group runs into lines by
/// vertical position, order lines top-to-bottom and runs left-to-right.
fn assemble_page_text(mut runs: Vec<PositionedRun>) -> String {
    if runs.is_empty() {
        return String::new();
    }

    runs.sort_by(|a, b| {
        b.y.partial_cmp(&a.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut lines: Vec<String> = Vec::new();
    let mut current_y = runs[0].y;
    let mut current_line: Vec<String> = Vec::new();

    for run in runs {
        if (current_y - run.y).abs() > LINE_BUCKET {
            if !current_line.is_empty() {
                lines.push(current_line.join(" "));
            }
            current_line = Vec::new();
            current_y = run.y;
        }
        current_line.push(run.text.trim().to_string());
    }
    if !current_line.is_empty() {
        lines.push(current_line.join(" "));
    }

    lines.join("\n")
}

/// Tier 2: layout-aware extraction for tables and mixed content. Orders
/// positioned text runs instead of relying on content-stream order.
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

    for (page_number, page_id) in &page_map {
        let raw_text = assemble_page_text(positioned_runs(&doc, *page_id));
        let normalized_text = TextNormalizer::normalize(&raw_text);

        pages.push(ExtractedPage {
            page_number: page_number - 1,
            is_empty: TextNormalizer::is_empty_page(&normalized_text),
            word_count: normalized_text.split_whitespace().count(),
            char_count: normalized_text.chars().count(),
            line_count: raw_text.lines().count(),
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
    let doc_language = language
        .map(str::to_owned)
        .unwrap_or_else(|| LanguageDetector::detect(&full_text));
    for page in &mut pages {
        page.language = Some(doc_language.clone());
    }

    let empty_pages = pages.iter().filter(|p| p.is_empty).count();
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    let mut metadata = serde_json::Map::new();
    metadata.insert("layout_line_bucket".into(), json!(LINE_BUCKET));
    metadata.insert("empty_pages".into(), json!(empty_pages));
    metadata.insert("non_empty_pages".into(), json!(pages.len() - empty_pages));

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
    fn assembles_runs_in_reading_order() {
        let runs = vec![
            PositionedRun {
                x: 100.0,
                y: 700.0,
                text: "right".into(),
            },
            PositionedRun {
                x: 10.0,
                y: 700.5,
                text: "left".into(),
            },
            PositionedRun {
                x: 10.0,
                y: 650.0,
                text: "second line".into(),
            },
        ];
        assert_eq!(assemble_page_text(runs), "left right\nsecond line");
    }

    #[test]
    fn empty_runs_produce_empty_text() {
        assert_eq!(assemble_page_text(Vec::new()), "");
    }
}
