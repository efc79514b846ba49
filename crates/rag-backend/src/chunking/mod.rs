pub mod recursive;
pub mod sliding;

use std::time::Instant;

use thiserror::Error;

use crate::models::chunk::{
    Chunk, ChunkMetadata, ChunkingConfig, ChunkingQualityMetrics, ChunkingResult,
    ChunkingStrategy, PositionRange,
};
use crate::models::document::ExtractedDocument;

pub use recursive::RecursiveChunker;
pub use sliding::SlidingWindowChunker;

/// Low-level chunk with character offsets relative to its source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub content: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidOverlap { overlap: usize, chunk_size: usize },
}

/// Chunking orchestration over an `ExtractedDocument`.
///
/// Runs the configured strategy over each non-empty page, applies min/max
/// size constraints, and wraps raw chunks with provenance metadata and
/// quality scores.
#[derive(Debug, Default, Clone)]
pub struct ChunkingService;

impl ChunkingService {
    pub fn new() -> Self {
        ChunkingService
    }

    pub fn chunk_document(
        &self,
        document: &ExtractedDocument,
        config: &ChunkingConfig,
    ) -> Result<ChunkingResult, ChunkingError> {
        tracing::info!(
            document_id = %document.document_id,
            strategy = ?config.strategy,
            "chunking_started"
        );

        let start = Instant::now();
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut empty_chunks_discarded = 0usize;

        for page in &document.pages {
            if page.is_empty || page.normalized_text.trim().is_empty() {
                continue;
            }

            let raw_chunks = match config.strategy {
                ChunkingStrategy::SlidingWindow => SlidingWindowChunker::chunk(
                    &page.normalized_text,
                    config.chunk_size_chars,
                    config.chunk_overlap_chars,
                )?,
                ChunkingStrategy::Recursive => RecursiveChunker::chunk(
                    &page.normalized_text,
                    config.chunk_size_chars,
                    &config.separators,
                    config.keep_separator,
                ),
            };

            for raw in raw_chunks {
                let mut content = raw.content;
                let mut end = raw.end;

                if content.chars().count() < config.min_chunk_size_chars {
                    empty_chunks_discarded += 1;
                    continue;
                }

                if content.chars().count() > config.max_chunk_size_chars {
                    content = content.chars().take(config.max_chunk_size_chars).collect();
                    end = raw.start + content.chars().count();
                }

                let metadata = ChunkMetadata {
                    page_number: page.page_number,
                    position_in_page: PositionRange {
                        start: raw.start,
                        end,
                    },
                    section_title: page.section_title.clone(),
                    document_type: Some(document.format),
                    source_filename: Some(document.filename.clone()),
                    language: page
                        .language
                        .clone()
                        .or_else(|| Some(document.language.clone())),
                    chunk_index: None,
                    user_id: None,
                    attributes: Default::default(),
                };

                chunks.push(Chunk::from_content(content, document.document_id, metadata));
            }
        }

        // Chunks are produced in reading order; the index doubles as the
        // stable ordering key for storage backends.
        for (index, chunk) in chunks.iter_mut().enumerate() {
            chunk.metadata.chunk_index = Some(index);
        }

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let total_chunks = chunks.len();
        let total_chars: usize = chunks.iter().map(|c| c.char_count).sum();
        let total_tokens: usize = chunks.iter().map(|c| c.token_count).sum();

        let quality_metrics = ChunkingQualityMetrics {
            avg_chunk_size_chars: if total_chunks > 0 {
                total_chars as f64 / total_chunks as f64
            } else {
                0.0
            },
            total_tokens_across_chunks: total_tokens,
            total_chunks,
            empty_chunks_discarded,
        };

        tracing::info!(
            document_id = %document.document_id,
            strategy = ?config.strategy,
            duration_ms,
            total_chunks,
            "chunking_completed"
        );

        Ok(ChunkingResult {
            document_id: document.document_id,
            total_chunks,
            chunks,
            chunking_config: config.clone(),
            chunking_duration_ms: duration_ms,
            quality_metrics,
        })
    }
}
