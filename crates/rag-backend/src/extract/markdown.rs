use std::time::Instant;

use chrono::Utc;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::extract::language::LanguageDetector;
use crate::extract::normalize::TextNormalizer;
use crate::models::document::{ExtractedDocument, ExtractedPage, FileFormat};

/// Extracts markdown files, tracking headings and preserving fenced code
/// blocks verbatim. Produces a single page with `page_number == 0`.
pub struct MarkdownExtractor;

struct LineCollector {
    lines: Vec<String>,
    current: String,
}

impl LineCollector {
    fn new() -> Self {
        LineCollector {
            lines: Vec::new(),
            current: String::new(),
        }
    }

    /// Append text, honoring embedded newlines (code blocks carry them).
    fn push_text(&mut self, text: &str) {
        let mut parts = text.split('\n');
        if let Some(first) = parts.next() {
            self.current.push_str(first);
        }
        for part in parts {
            self.flush();
            self.current.push_str(part);
        }
    }

    fn flush(&mut self) {
        self.lines.push(std::mem::take(&mut self.current));
    }

    fn flush_non_empty(&mut self) {
        if !self.current.is_empty() {
            self.flush();
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush_non_empty();
        self.lines
    }
}

impl MarkdownExtractor {
    /// Parse a leading `---` delimited frontmatter block into key/value
    /// metadata; returns the metadata and the body without the block.
    fn split_frontmatter(text: &str) -> (Map<String, Value>, String) {
        let mut metadata = Map::new();
        let lines: Vec<&str> = text.split('\n').collect();

        if lines.first().map(|l| l.trim()) != Some("---") {
            return (metadata, text.to_string());
        }

        let Some(end_index) = lines
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, line)| line.trim() == "---")
            .map(|(i, _)| i)
        else {
            return (metadata, text.to_string());
        };

        for line in &lines[1..end_index] {
            if let Some((key, value)) = line.split_once(':') {
                metadata.insert(key.trim().to_string(), json!(value.trim()));
            }
        }

        (metadata, lines[end_index + 1..].join("\n"))
    }

    pub fn extract(content: &[u8], document_id: Uuid, filename: &str) -> ExtractedDocument {
        let start = Instant::now();

        let text = match std::str::from_utf8(content) {
            Ok(text) => text.to_string(),
            Err(_) => String::from_utf8_lossy(content).into_owned(),
        };

        let (mut metadata, body) = Self::split_frontmatter(&text);

        let mut collector = LineCollector::new();
        let mut section_title: Option<String> = None;
        let mut section_hierarchy: Vec<Value> = Vec::new();

        let mut in_heading = false;
        let mut heading_level: usize = 0;
        let mut heading_text = String::new();

        for event in Parser::new(&body) {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    collector.flush_non_empty();
                    in_heading = true;
                    heading_level = level as usize;
                    heading_text.clear();
                }
                Event::End(TagEnd::Heading(_)) => {
                    in_heading = false;
                    let heading = heading_text.trim().to_string();
                    collector.push_text(&heading);
                    collector.flush();
                    if !heading.is_empty() {
                        section_title = Some(heading.clone());
                    }
                    section_hierarchy.push(json!({ "level": heading_level, "title": heading }));
                }
                Event::Start(Tag::CodeBlock(_)) => {
                    collector.flush_non_empty();
                }
                Event::End(TagEnd::CodeBlock) => {
                    collector.flush_non_empty();
                }
                Event::End(TagEnd::Paragraph) | Event::End(TagEnd::Item) => {
                    collector.flush_non_empty();
                }
                Event::Text(text) => {
                    if in_heading {
                        heading_text.push_str(&text);
                    } else {
                        // Code block contents arrive here verbatim; inline
                        // emphasis and link labels arrive already stripped.
                        collector.push_text(&text);
                    }
                }
                Event::Code(code) => {
                    if in_heading {
                        heading_text.push_str(&code);
                    } else {
                        collector.push_text(&code);
                    }
                }
                Event::SoftBreak | Event::HardBreak => {
                    collector.flush_non_empty();
                }
                Event::Rule => {
                    collector.flush_non_empty();
                }
                _ => {}
            }
        }

        let cleaned_lines = collector.finish();
        let raw_text = cleaned_lines.join("\n");
        let normalized_text = TextNormalizer::normalize(&raw_text);

        let is_empty = TextNormalizer::is_empty_page(&normalized_text);
        let word_count = normalized_text.split_whitespace().count();
        let char_count = normalized_text.chars().count();
        let line_count = cleaned_lines.len();

        let language = LanguageDetector::detect(if normalized_text.is_empty() {
            &raw_text
        } else {
            &normalized_text
        });

        let page = ExtractedPage {
            page_number: 0,
            raw_text,
            normalized_text,
            is_empty,
            word_count,
            char_count,
            line_count,
            language: Some(language.clone()),
            section_title: section_title.clone(),
            confidence_score: 1.0,
        };

        metadata.insert("section_hierarchy".into(), Value::Array(section_hierarchy));
        metadata.insert("total_words".into(), json!(word_count));
        metadata.insert("total_chars".into(), json!(char_count));
        metadata.insert("empty_pages".into(), json!(u8::from(is_empty)));
        metadata.insert("non_empty_pages".into(), json!(1 - u8::from(is_empty)));

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(
            filename,
            document_id = %document_id,
            language = %language,
            duration_ms,
            "markdown_extraction_completed"
        );

        ExtractedDocument {
            document_id,
            filename: filename.to_string(),
            format: FileFormat::Markdown,
            language,
            total_pages: 1,
            pages: vec![page],
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
    fn parses_frontmatter_into_metadata() {
        let content = "---\ntitle: My Doc\nauthor: Jane\n---\n# Intro\nBody text here today.";
        let doc = MarkdownExtractor::extract(content.as_bytes(), Uuid::new_v4(), "doc.md");

        assert_eq!(doc.extraction_metadata["title"], "My Doc");
        assert_eq!(doc.extraction_metadata["author"], "Jane");
        assert_eq!(doc.total_pages, 1);
        assert_eq!(doc.pages[0].page_number, 0);
    }

    #[test]
    fn headings_set_section_title_and_hierarchy() {
        let content = "# Top\nsome text here\n## Nested Section\nmore body text";
        let doc = MarkdownExtractor::extract(content.as_bytes(), Uuid::new_v4(), "doc.md");

        assert_eq!(doc.pages[0].section_title.as_deref(), Some("Nested Section"));
        let hierarchy = doc.extraction_metadata["section_hierarchy"]
            .as_array()
            .unwrap();
        assert_eq!(hierarchy.len(), 2);
        assert_eq!(hierarchy[0]["level"], 1);
        assert_eq!(hierarchy[0]["title"], "Top");
        assert_eq!(hierarchy[1]["level"], 2);
    }

    #[test]
    fn strips_emphasis_links_and_bullets() {
        let content = "- **bold item** one\n- plain item two\n\nSee [the docs](https://example.com) for more.";
        let doc = MarkdownExtractor::extract(content.as_bytes(), Uuid::new_v4(), "doc.md");

        let text = &doc.pages[0].normalized_text;
        assert!(text.contains("bold item one"));
        assert!(text.contains("plain item two"));
        assert!(text.contains("the docs"));
        assert!(!text.contains("**"));
        assert!(!text.contains("example.com"));
        assert!(!text.contains("- "));
    }

    #[test]
    fn code_blocks_are_preserved_verbatim() {
        let content = "Intro paragraph text.\n\n```\nlet x = 1;\nlet y = 2;\n```\n\nAfter code.";
        let doc = MarkdownExtractor::extract(content.as_bytes(), Uuid::new_v4(), "doc.md");

        let text = &doc.pages[0].normalized_text;
        assert!(text.contains("let x = 1;"));
        assert!(text.contains("let y = 2;"));
    }
}
