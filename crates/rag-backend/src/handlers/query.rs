use std::collections::HashMap;

use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::guardrails::{InputValidator, TimeoutManager};
use crate::models::generation::{QueryGenerationRequest, QueryGenerationResponse};
use crate::state::AppContext;
use crate::utils::error::ApiError;

/// `POST /api/query`: full retrieval-augmented generation.
pub async fn query_handler(
    Extension(ctx): Extension<AppContext>,
    Json(request): Json<QueryGenerationRequest>,
) -> Result<Json<QueryGenerationResponse>, ApiError> {
    tracing::info!(
        query_preview = %request.query.chars().take(100).collect::<String>(),
        top_k = request.top_k,
        "query_endpoint_called"
    );

    let timeout = TimeoutManager::new(ctx.settings.query.timeout_seconds);
    let response = ctx
        .generation_orchestrator
        .generate_answer(&request, &timeout)
        .await?;

    Ok(Json(response))
}

fn default_top_k() -> usize {
    10
}

fn default_include_sources() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub filters: Option<HashMap<String, Value>>,
    #[serde(default = "default_include_sources")]
    pub include_sources: bool,
}

#[derive(Debug, Serialize)]
pub struct RetrievalChunkView {
    pub chunk_id: Uuid,
    pub content: String,
    pub similarity_score: f32,
    pub rank: u32,
    pub source: HashMap<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct RetrievalMetrics {
    pub embedding_latency_ms: f64,
    pub retrieval_latency_ms: f64,
    pub total_latency_ms: f64,
    pub total_results_available: usize,
    pub results_returned: usize,
    pub embedding_cache_enabled: bool,
    pub embedding_cache_hit: bool,
}

#[derive(Debug, Serialize)]
pub struct RetrievalResponse {
    pub query_id: Uuid,
    pub query_text: String,
    pub retrieved_chunks: Vec<RetrievalChunkView>,
    pub metrics: RetrievalMetrics,
}

/// `POST /retrieve`: retrieval only, no generation.
pub async fn retrieve_handler(
    Extension(ctx): Extension<AppContext>,
    Json(request): Json<RetrievalRequest>,
) -> Result<Json<RetrievalResponse>, ApiError> {
    InputValidator::validate_request(&request.query, request.top_k)?;

    tracing::info!(
        query_preview = %request.query.chars().take(100).collect::<String>(),
        top_k = request.top_k,
        "retrieve_endpoint_called"
    );

    let outcome = ctx
        .query_orchestrator
        .query(&request.query, request.top_k, request.filters.as_ref())
        .await?;

    let retrieved_chunks: Vec<RetrievalChunkView> = outcome
        .retrieved_chunks
        .iter()
        .map(|chunk| {
            let mut source = HashMap::new();
            if request.include_sources {
                if let Some(document_id) = chunk.document_id {
                    source.insert("document_id".to_string(), Value::from(document_id.to_string()));
                }
                if let Some(file) = &chunk.metadata.source_filename {
                    source.insert("source_filename".to_string(), Value::from(file.clone()));
                }
                source.insert(
                    "page_number".to_string(),
                    Value::from(chunk.metadata.page_number),
                );
                if let Some(section) = &chunk.metadata.section_title {
                    source.insert("section_title".to_string(), Value::from(section.clone()));
                }
                if let Some(language) = &chunk.metadata.language {
                    source.insert("language".to_string(), Value::from(language.clone()));
                }
            }

            RetrievalChunkView {
                chunk_id: chunk.chunk_id,
                content: chunk.content.clone(),
                similarity_score: chunk.similarity_score,
                rank: chunk.rank,
                source,
            }
        })
        .collect();

    let results_returned = retrieved_chunks.len();

    Ok(Json(RetrievalResponse {
        query_id: outcome.query_id,
        query_text: outcome.query_text,
        retrieved_chunks,
        metrics: RetrievalMetrics {
            embedding_latency_ms: outcome.metrics.embedding_latency_ms,
            retrieval_latency_ms: outcome.metrics.retrieval_latency_ms,
            total_latency_ms: outcome.metrics.total_latency_ms,
            total_results_available: outcome.metrics.total_results_available,
            results_returned,
            embedding_cache_enabled: outcome.metrics.embedding_cache_enabled,
            embedding_cache_hit: outcome.metrics.embedding_cache_hit,
        },
    }))
}
