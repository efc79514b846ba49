use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::chunk::ChunkMetadata;

/// A chunk returned from similarity search, ranked and scored.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: Uuid,
    pub content: String,
    /// Cosine similarity against the query vector, clipped to [0, 1].
    pub similarity_score: f32,
    /// Dense rank, 1 = most similar.
    pub rank: u32,
    pub retrieval_method: String,

    pub document_id: Option<Uuid>,
    pub metadata: ChunkMetadata,
    pub quality_score: Option<f32>,

    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Metrics for the embed → retrieve portion of a query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryMetrics {
    pub embedding_latency_ms: f64,
    pub retrieval_latency_ms: f64,
    pub total_latency_ms: f64,
    pub total_results_available: usize,
    pub embedding_cache_enabled: bool,
    pub embedding_cache_hit: bool,
}

/// Internal outcome of the embed → retrieve pipeline.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub query_id: Uuid,
    pub query_text: String,
    pub query_embedding: Vec<f32>,
    pub retrieved_chunks: Vec<RetrievedChunk>,
    pub metrics: QueryMetrics,
}
