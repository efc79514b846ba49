use lopdf::{Document, Object, ObjectId};
use serde::Serialize;

use crate::extract::ExtractionError;

/// Pre-analysis of a PDF used to route between extraction tiers.
#[derive(Debug, Clone, Serialize)]
pub struct PdfAnalysis {
    pub page_count: usize,
    pub has_text: bool,
    pub has_tables: bool,
    pub has_images: bool,
    /// Fraction of sampled pages with more than 50 extracted characters.
    pub extractability_ratio: f32,
    pub avg_chars_per_page: f32,
    pub is_encrypted: bool,
    pub is_scanned: bool,
    pub recommended_tier: u8,
}

pub(crate) fn is_encrypted(doc: &Document) -> bool {
    doc.trailer.get(b"Encrypt").is_ok()
}

/// Columnar-looking text: several lines with repeated wide gaps or pipes.
pub(crate) fn detect_table_like_layout(text: &str) -> bool {
    let mut columnar_lines = 0;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let gaps = trimmed.matches("  ").count();
        let pipes = trimmed.matches('|').count();
        if gaps >= 2 || pipes >= 2 {
            columnar_lines += 1;
            if columnar_lines >= 3 {
                return true;
            }
        }
    }
    false
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a lopdf::Dictionary> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

pub(crate) fn page_has_images(doc: &Document, page_id: ObjectId) -> bool {
    let Ok(page_dict) = doc.get_dictionary(page_id) else {
        return false;
    };
    let Ok(resources_obj) = page_dict.get(b"Resources") else {
        return false;
    };
    let Some(resources) = resolve_dict(doc, resources_obj) else {
        return false;
    };
    let Ok(xobjects_obj) = resources.get(b"XObject") else {
        return false;
    };
    let Some(xobjects) = resolve_dict(doc, xobjects_obj) else {
        return false;
    };

    for (_, value) in xobjects.iter() {
        let resolved = match value {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(object) => object,
                Err(_) => continue,
            },
            other => other,
        };
        if let Object::Stream(stream) = resolved {
            if let Ok(Object::Name(name)) = stream.dict.get(b"Subtype") {
                if name.as_slice() == b"Image" {
                    return true;
                }
            }
        }
    }
    false
}

/// Open the document and sample up to three pages (first, middle, last) to
/// estimate extractability and recommend a tier.
pub fn analyze(
    content: &[u8],
    filename: &str,
    extractability_threshold: f32,
) -> Result<PdfAnalysis, ExtractionError> {
    let doc = Document::load_mem(content).map_err(|err| {
        ExtractionError::new(filename, "corrupt_file", format!("Failed to open PDF: {err}"))
    })?;

    let pages = doc.get_pages();
    let page_count = pages.len();
    let encrypted = is_encrypted(&doc);

    if encrypted || page_count == 0 {
        return Ok(PdfAnalysis {
            page_count,
            has_text: false,
            has_tables: false,
            has_images: false,
            extractability_ratio: 0.0,
            avg_chars_per_page: 0.0,
            is_encrypted: encrypted,
            is_scanned: false,
            recommended_tier: 1,
        });
    }

    let mut sample_numbers = vec![1u32];
    let middle = (page_count as u32 + 1) / 2;
    if !sample_numbers.contains(&middle) {
        sample_numbers.push(middle);
    }
    let last = page_count as u32;
    if !sample_numbers.contains(&last) {
        sample_numbers.push(last);
    }

    let mut total_chars = 0usize;
    let mut extractable_pages = 0usize;
    let mut has_text = false;
    let mut has_tables = false;
    let mut has_images = false;

    for number in &sample_numbers {
        let text = doc.extract_text(&[*number]).unwrap_or_default();
        let chars = text.trim().chars().count();
        total_chars += chars;
        if chars > 0 {
            has_text = true;
        }
        if chars > 50 {
            extractable_pages += 1;
        }
        if detect_table_like_layout(&text) {
            has_tables = true;
        }
        if let Some(page_id) = pages.get(number) {
            if page_has_images(&doc, *page_id) {
                has_images = true;
            }
        }
    }

    let sampled = sample_numbers.len();
    let extractability_ratio = extractable_pages as f32 / sampled as f32;
    let avg_chars_per_page = total_chars as f32 / sampled as f32;
    let is_scanned = extractability_ratio < extractability_threshold;

    let recommended_tier = if is_scanned {
        4
    } else if has_tables && has_images {
        3
    } else if has_tables || has_images {
        2
    } else {
        1
    };

    Ok(PdfAnalysis {
        page_count,
        has_text,
        has_tables,
        has_images,
        extractability_ratio,
        avg_chars_per_page,
        is_encrypted: encrypted,
        is_scanned,
        recommended_tier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_bytes_are_rejected() {
        let err = analyze(b"definitely not a pdf", "bad.pdf", 0.3).unwrap_err();
        assert_eq!(err.error_type, "corrupt_file");
    }

    #[test]
    fn table_layout_heuristic() {
        let tabular = "name    qty    price\nfoo    1    2.00\nbar    2    4.00\nbaz    3    6.00";
        assert!(detect_table_like_layout(tabular));

        let prose = "This is a paragraph of running prose.\nIt has no columns at all.";
        assert!(!detect_table_like_layout(prose));
    }
}
