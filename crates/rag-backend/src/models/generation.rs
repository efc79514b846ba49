use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

fn default_top_k() -> usize {
    10
}

fn default_include_sources() -> bool {
    true
}

/// User request for answer generation.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryGenerationRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub filters: Option<HashMap<String, Value>>,
    #[serde(default = "default_include_sources")]
    pub include_sources: bool,
}

/// Citation to a source chunk used in the answer.
#[derive(Debug, Clone, Serialize)]
pub struct CitationEntry {
    pub source_index: u32,
    pub chunk_id: Uuid,
    pub document_id: Option<Uuid>,
    pub source_file: Option<String>,
    pub page: Option<u32>,
    pub similarity_score: f32,
    pub preview: String,
}

/// Chunk that was packed into the prompt context for generation.
#[derive(Debug, Clone, Serialize)]
pub struct UsedChunk {
    pub chunk_id: Uuid,
    pub rank: u32,
    pub similarity_score: f32,
    pub content_preview: String,
}

/// Per-stage latency and usage metrics for one generation run.
#[derive(Debug, Clone, Serialize)]
pub struct QueryGenerationMetadata {
    pub total_latency_ms: f64,
    pub embedding_latency_ms: f64,
    pub retrieval_latency_ms: f64,
    pub prompt_assembly_latency_ms: f64,
    pub generation_latency_ms: f64,
    pub answer_processing_latency_ms: f64,
    pub total_tokens_used: u32,
    pub model: String,
    pub chunks_retrieved: usize,
}

/// Generated answer with citations and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct QueryGenerationResponse {
    pub query_id: Uuid,
    pub answer: String,
    pub citations: Vec<CitationEntry>,
    pub used_chunks: Vec<UsedChunk>,
    pub metadata: QueryGenerationMetadata,
}
