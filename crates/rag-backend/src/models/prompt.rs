use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::models::query::RetrievedChunk;

/// Internal request for constructing a prompt from retrieved chunks.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub request_id: Uuid,
    pub query_text: String,
    pub retrieved_chunks: Vec<RetrievedChunk>,
    pub model: String,
    pub max_tokens_for_response: usize,
    pub include_sources: bool,
}

impl PromptRequest {
    pub fn new(query_text: String, retrieved_chunks: Vec<RetrievedChunk>, model: String) -> Self {
        PromptRequest {
            request_id: Uuid::new_v4(),
            query_text,
            retrieved_chunks,
            model,
            max_tokens_for_response: 1500,
            include_sources: true,
        }
    }
}

/// Metadata about one cited chunk, keyed by its `[Source N]` index.
#[derive(Debug, Clone, Serialize)]
pub struct CitationSource {
    pub chunk_id: Uuid,
    pub document_id: Option<Uuid>,
    pub source_file: Option<String>,
    pub page: Option<u32>,
    pub section_title: Option<String>,
    pub similarity_score: f32,
    pub preview: String,
}

/// Token accounting for an assembled prompt.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenMetrics {
    pub system_prompt: usize,
    pub query: usize,
    pub history: usize,
    pub examples: usize,
    pub response_reserved: usize,
    pub available_for_context: usize,
    pub total_used: usize,
    pub context_window: usize,
    pub context_tokens: usize,
    pub chunks_included: usize,
    pub chunks_truncated: usize,
}

/// Assembled prompt plus the citation map backing its `[Source N]` markers.
///
/// Invariant: `citation_map` keys are dense 1..N and correspond 1:1 to the
/// markers emitted into `user_message`.
#[derive(Debug, Clone)]
pub struct PromptResponse {
    pub request_id: Uuid,
    pub system_message: String,
    pub user_message: String,
    pub citation_map: BTreeMap<u32, CitationSource>,
    pub token_metrics: TokenMetrics,
    pub chunks_included: usize,
    pub chunks_truncated: usize,
    pub assembly_latency_ms: f64,
}
