use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::document::FileFormat;

/// Character range of a chunk within its source page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRange {
    pub start: usize,
    pub end: usize,
}

/// Provenance metadata carried by every chunk.
///
/// Well-known fields are typed; anything else travels in `attributes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub page_number: u32,
    pub position_in_page: PositionRange,
    pub section_title: Option<String>,
    pub document_type: Option<FileFormat>,
    pub source_filename: Option<String>,
    pub language: Option<String>,
    pub chunk_index: Option<usize>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ChunkMetadata {
    /// True when this metadata record matches a single filter key/value.
    ///
    /// Typed fields are checked first; unknown keys fall through to the
    /// open attributes map.
    pub fn matches(&self, key: &str, value: &Value) -> bool {
        match key {
            "page_number" => value.as_u64() == Some(self.page_number as u64),
            "section_title" => self.section_title.as_deref() == value.as_str(),
            "document_type" => self.document_type.map(|f| f.as_str()) == value.as_str(),
            "source_filename" | "source" => self.source_filename.as_deref() == value.as_str(),
            "language" => self.language.as_deref() == value.as_str(),
            "chunk_index" => value.as_u64() == self.chunk_index.map(|i| i as u64),
            "user_id" => self.user_id.as_deref() == value.as_str(),
            other => self.attributes.get(other) == Some(value),
        }
    }
}

/// Single retrieval unit produced by the chunking pipeline.
///
/// Embeddings are attached later in the embedding/storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub original_content: String,
    pub metadata: ChunkMetadata,

    pub token_count: usize,
    pub word_count: usize,
    pub char_count: usize,
    pub quality_score: f32,

    pub has_valid_embedding: bool,
    pub is_duplicate: bool,

    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Build a fully-formed chunk, computing counts and the quality score.
    pub fn from_content(content: String, document_id: Uuid, metadata: ChunkMetadata) -> Chunk {
        let word_count = content.split_whitespace().count();
        let char_count = content.chars().count();
        let token_count = (word_count as f64 * 1.3).round() as usize;

        Chunk {
            chunk_id: Uuid::new_v4(),
            document_id,
            original_content: content.clone(),
            content,
            metadata,
            token_count,
            word_count,
            char_count,
            quality_score: quality_score_for(token_count),
            has_valid_embedding: false,
            is_duplicate: false,
            created_at: Utc::now(),
        }
    }
}

/// Deterministic chunk quality score from the approximate token count.
///
/// Peaks for medium-sized chunks (300..=800 tokens), ramps up below and
/// decays linearly to zero at 1600 tokens.
pub fn quality_score_for(token_count: usize) -> f32 {
    const IDEAL_MIN: f32 = 300.0;
    const IDEAL_MAX: f32 = 800.0;

    if token_count == 0 {
        return 0.0;
    }

    let tokens = token_count as f32;
    if tokens <= IDEAL_MIN {
        return (tokens / IDEAL_MIN).max(0.1);
    }
    if tokens <= IDEAL_MAX {
        return 1.0;
    }

    (1.0 - (tokens - IDEAL_MAX) / IDEAL_MAX).max(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    SlidingWindow,
    Recursive,
}

/// Configuration for the chunking engine. Operates purely in character
/// space; token-based ingestion settings are translated upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub strategy: ChunkingStrategy,
    pub chunk_size_chars: usize,
    pub chunk_overlap_chars: usize,
    /// Separators for recursive splitting, tried in order.
    pub separators: Vec<String>,
    pub keep_separator: bool,
    /// Chunks smaller than this are discarded.
    pub min_chunk_size_chars: usize,
    /// Chunks larger than this are truncated.
    pub max_chunk_size_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig {
            strategy: ChunkingStrategy::Recursive,
            chunk_size_chars: 2000,
            chunk_overlap_chars: 200,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                ".".to_string(),
                " ".to_string(),
            ],
            keep_separator: false,
            min_chunk_size_chars: 10,
            max_chunk_size_chars: 8000,
        }
    }
}

/// Aggregate metrics about one chunking run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkingQualityMetrics {
    pub avg_chunk_size_chars: f64,
    pub total_tokens_across_chunks: usize,
    pub total_chunks: usize,
    pub empty_chunks_discarded: usize,
}

/// Result of chunking one document.
#[derive(Debug, Clone)]
pub struct ChunkingResult {
    pub document_id: Uuid,
    pub total_chunks: usize,
    pub chunks: Vec<Chunk>,
    pub chunking_config: ChunkingConfig,
    pub chunking_duration_ms: f64,
    pub quality_metrics: ChunkingQualityMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_score_shape() {
        assert_eq!(quality_score_for(0), 0.0);
        assert!((quality_score_for(3) - 0.1).abs() < 1e-6);
        assert!((quality_score_for(150) - 0.5).abs() < 1e-6);
        assert_eq!(quality_score_for(300), 1.0);
        assert_eq!(quality_score_for(800), 1.0);
        assert!((quality_score_for(1200) - 0.5).abs() < 1e-6);
        assert_eq!(quality_score_for(1600), 0.0);
        assert_eq!(quality_score_for(5000), 0.0);
    }

    #[test]
    fn chunk_counts_are_consistent() {
        let meta = ChunkMetadata {
            page_number: 0,
            position_in_page: PositionRange { start: 0, end: 11 },
            section_title: None,
            document_type: Some(FileFormat::Txt),
            source_filename: Some("a.txt".into()),
            language: Some("en".into()),
            chunk_index: None,
            user_id: None,
            attributes: Default::default(),
        };
        let chunk = Chunk::from_content("hello world".into(), Uuid::new_v4(), meta);
        assert_eq!(chunk.word_count, 2);
        assert_eq!(chunk.char_count, 11);
        assert_eq!(chunk.token_count, 3); // round(2 * 1.3)
        assert!(!chunk.has_valid_embedding);
        assert!(!chunk.is_duplicate);
    }

    #[test]
    fn metadata_filter_matching() {
        let meta = ChunkMetadata {
            page_number: 4,
            position_in_page: PositionRange { start: 0, end: 5 },
            section_title: Some("Intro".into()),
            document_type: Some(FileFormat::Pdf),
            source_filename: Some("doc.pdf".into()),
            language: Some("en".into()),
            chunk_index: Some(2),
            user_id: Some("u1".into()),
            attributes: Default::default(),
        };
        assert!(meta.matches("page_number", &serde_json::json!(4)));
        assert!(meta.matches("document_type", &serde_json::json!("pdf")));
        assert!(meta.matches("language", &serde_json::json!("en")));
        assert!(!meta.matches("language", &serde_json::json!("fr")));
        assert!(!meta.matches("unknown_key", &serde_json::json!("x")));
    }
}
