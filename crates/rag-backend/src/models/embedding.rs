use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::chunk::ChunkMetadata;

pub const STANDARD_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const STANDARD_EMBEDDING_DIMENSION: usize = 1536;

/// Input payload for the embedding layer, derived from a `Chunk`.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub token_count: usize,
    pub quality_score: f32,
}

/// Persisted or in-memory vector embedding for a chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub embedding_id: Uuid,
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,

    /// Dense vector representation.
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    pub embedding_dimension: usize,

    pub metadata: ChunkMetadata,
    /// Chunk-level quality score propagated from chunking.
    pub quality_score: f32,
    /// Quality score derived from embedding properties.
    pub embedding_quality_score: f32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Configuration for batch embedding operations.
#[derive(Debug, Clone)]
pub struct BatchEmbeddingConfig {
    /// Number of chunks per provider API call.
    pub batch_size: usize,
    pub model: String,
    /// Maximum retry attempts on provider failure.
    pub max_retries: u32,
    /// Initial backoff for exponential retry.
    pub base_backoff_seconds: f64,
    pub timeout_seconds: f64,
    pub embedding_dimension: usize,
    /// Skip embedding if identical content is already stored.
    pub skip_duplicate_content: bool,
}

impl Default for BatchEmbeddingConfig {
    fn default() -> Self {
        BatchEmbeddingConfig {
            batch_size: 10,
            model: STANDARD_EMBEDDING_MODEL.to_string(),
            max_retries: 3,
            base_backoff_seconds: 1.0,
            timeout_seconds: 30.0,
            embedding_dimension: STANDARD_EMBEDDING_DIMENSION,
            skip_duplicate_content: true,
        }
    }
}

/// A failed embedding attempt for a single chunk.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingFailure {
    pub chunk_id: Uuid,
    pub error: String,
    pub retry_count: u32,
    /// Pipeline stage the failure occurred in ("provider", "validation").
    pub stage: Option<String>,
    pub issues: Vec<String>,
}

/// Result of an embedding + persistence operation.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingResult {
    pub total_inputs: usize,
    pub total_batches: usize,
    pub successful_embeddings: usize,
    pub failed_embeddings: usize,

    pub embeddings: Vec<Embedding>,
    pub failures: Vec<EmbeddingFailure>,

    pub embedding_duration_ms: f64,
    pub storage_duration_ms: f64,
    pub total_duration_ms: f64,

    pub tokens_used_estimate: usize,
    pub duplicates_skipped: usize,
    pub avg_embedding_quality_score: f32,
}
