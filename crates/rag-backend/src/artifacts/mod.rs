use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::config::DebugConfig;
use crate::guardrails::trace::TraceContext;
use crate::models::generation::{CitationEntry, QueryGenerationMetadata, UsedChunk};
use crate::models::prompt::{CitationSource, TokenMetrics};
use crate::models::query::RetrievedChunk;
use crate::query::llm::TokenUsage;
use crate::storage::StorageError;

/// One stored debug artifact, as returned by the debug endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ArtifactRecord {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub data: Value,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Pluggable storage for debug artifacts, keyed by trace id. Artifacts
/// for one trace id are returned in insertion order.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn store(
        &self,
        trace_id: &str,
        artifact_type: &str,
        data: Value,
    ) -> Result<(), StorageError>;

    async fn get_by_trace_id(&self, trace_id: &str) -> Result<Vec<ArtifactRecord>, StorageError>;

    /// Delete artifacts older than the retention window; returns how many
    /// were removed.
    async fn cleanup_old_artifacts(&self, retention_hours: i64) -> Result<u64, StorageError>;
}

/// In-memory artifact storage for development and tests.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    artifacts: Mutex<HashMap<String, Vec<ArtifactRecord>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn store(
        &self,
        trace_id: &str,
        artifact_type: &str,
        data: Value,
    ) -> Result<(), StorageError> {
        let mut artifacts = self.artifacts.lock();
        artifacts
            .entry(trace_id.to_string())
            .or_default()
            .push(ArtifactRecord {
                artifact_type: artifact_type.to_string(),
                data,
                timestamp: Some(Utc::now()),
            });
        Ok(())
    }

    async fn get_by_trace_id(&self, trace_id: &str) -> Result<Vec<ArtifactRecord>, StorageError> {
        Ok(self
            .artifacts
            .lock()
            .get(trace_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn cleanup_old_artifacts(&self, retention_hours: i64) -> Result<u64, StorageError> {
        if retention_hours <= 0 {
            return Ok(0);
        }
        let cutoff = Utc::now() - Duration::hours(retention_hours);
        let mut deleted = 0u64;
        let mut artifacts = self.artifacts.lock();
        for records in artifacts.values_mut() {
            let before = records.len();
            records.retain(|record| record.timestamp.map_or(true, |ts| ts >= cutoff));
            deleted += (before - records.len()) as u64;
        }
        artifacts.retain(|_, records| !records.is_empty());
        Ok(deleted)
    }
}

/// Postgres-backed artifact storage (`debug_artifacts` table).
pub struct PgArtifactStore {
    pool: PgPool,
}

impl PgArtifactStore {
    pub fn new(pool: PgPool) -> Self {
        PgArtifactStore { pool }
    }
}

#[async_trait]
impl ArtifactStore for PgArtifactStore {
    async fn store(
        &self,
        trace_id: &str,
        artifact_type: &str,
        data: Value,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO debug_artifacts (trace_id, artifact_type, artifact_data, created_at) \
             VALUES ($1, $2, $3, NOW())",
        )
        .bind(trace_id)
        .bind(artifact_type)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_trace_id(&self, trace_id: &str) -> Result<Vec<ArtifactRecord>, StorageError> {
        let rows: Vec<(String, Value, DateTime<Utc>)> = sqlx::query_as(
            "SELECT artifact_type, artifact_data, created_at FROM debug_artifacts \
             WHERE trace_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(trace_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(artifact_type, data, created_at)| ArtifactRecord {
                artifact_type,
                data,
                timestamp: Some(created_at),
            })
            .collect())
    }

    async fn cleanup_old_artifacts(&self, retention_hours: i64) -> Result<u64, StorageError> {
        if retention_hours <= 0 {
            return Ok(0);
        }
        let result = sqlx::query(
            "DELETE FROM debug_artifacts WHERE created_at < NOW() - ($1 * INTERVAL '1 hour')",
        )
        .bind(retention_hours as f64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Truncate a string to a byte budget on a char boundary.
fn truncate_bytes(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Records one artifact per pipeline stage when debug logging is enabled.
///
/// Disabled logging short-circuits to a boolean check; store failures are
/// logged and swallowed so diagnostics never fail a request.
pub struct ArtifactLogger {
    settings: DebugConfig,
    store: std::sync::Arc<dyn ArtifactStore>,
}

impl ArtifactLogger {
    pub fn new(settings: DebugConfig, store: std::sync::Arc<dyn ArtifactStore>) -> Self {
        ArtifactLogger { settings, store }
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    async fn store_artifact(&self, artifact_type: &str, data: Value) {
        let trace_id = TraceContext::current_trace_id();
        tracing::info!(artifact_type, trace_id = %trace_id, "artifact_logged");

        if let Err(err) = self.store.store(&trace_id, artifact_type, data).await {
            tracing::warn!(error = %err, artifact_type, "artifact_store_failed");
        }
    }

    pub async fn log_query_artifact(
        &self,
        query_text: &str,
        top_k: usize,
        filters: Option<&crate::storage::MetadataFilters>,
    ) {
        if !self.settings.enabled {
            return;
        }

        let data = json!({
            "type": "query",
            "timestamp": now_iso(),
            "query_text": truncate_bytes(query_text, self.settings.max_artifact_size_bytes),
            "query_length": query_text.chars().count(),
            "top_k": top_k,
            "filters": filters.cloned().unwrap_or_default(),
            "query_tokens_estimate": query_text.split_whitespace().count(),
        });
        self.store_artifact("query", data).await;
    }

    pub async fn log_retrieved_chunks_artifact(
        &self,
        chunks: &[RetrievedChunk],
        retrieval_latency_ms: f64,
    ) {
        if !self.settings.enabled {
            return;
        }

        let chunks_data: Vec<Value> = chunks
            .iter()
            .map(|chunk| {
                let mut entry = json!({
                    "rank": chunk.rank,
                    "chunk_id": chunk.chunk_id,
                    "similarity_score": chunk.similarity_score,
                    "metadata": chunk.metadata,
                });
                if self.settings.include_chunk_content {
                    let content =
                        truncate_bytes(&chunk.content, self.settings.max_artifact_size_bytes);
                    entry["content_preview"] =
                        json!(content.chars().take(200).collect::<String>());
                    entry["content"] = json!(content);
                }
                entry
            })
            .collect();

        let avg_score = if chunks.is_empty() {
            0.0
        } else {
            chunks.iter().map(|c| c.similarity_score).sum::<f32>() / chunks.len() as f32
        };

        let data = json!({
            "type": "retrieved_chunks",
            "timestamp": now_iso(),
            "chunks_count": chunks.len(),
            "chunks_data": chunks_data,
            "retrieval_latency_ms": retrieval_latency_ms,
            "average_similarity_score": avg_score,
        });
        self.store_artifact("retrieved_chunks", data).await;
    }

    pub async fn log_prompt_artifact(
        &self,
        system_message: &str,
        user_message: &str,
        token_metrics: &TokenMetrics,
        citation_map: &std::collections::BTreeMap<u32, CitationSource>,
    ) {
        if !self.settings.enabled {
            return;
        }

        let mut data = json!({
            "type": "prompt",
            "timestamp": now_iso(),
            "system_prompt_tokens": token_metrics.system_prompt,
            "context_tokens": token_metrics.context_tokens,
            "response_tokens": token_metrics.response_reserved,
            "total_tokens": token_metrics.total_used + token_metrics.context_tokens,
        });

        if self.settings.include_prompt_details {
            data["system_message"] =
                json!(truncate_bytes(system_message, self.settings.max_artifact_size_bytes));
            data["user_message"] =
                json!(truncate_bytes(user_message, self.settings.max_artifact_size_bytes));
            data["citation_map"] = json!(citation_map);
        }

        self.store_artifact("prompt", data).await;
    }

    pub async fn log_answer_artifact(
        &self,
        answer_text: &str,
        raw_llm_output: Option<&str>,
        generation_latency_ms: f64,
        model: &str,
        usage: &TokenUsage,
    ) {
        if !self.settings.enabled {
            return;
        }

        let mut data = json!({
            "type": "answer",
            "timestamp": now_iso(),
            "answer_text": truncate_bytes(answer_text, self.settings.max_artifact_size_bytes),
            "generation_latency_ms": generation_latency_ms,
            "model": model,
            "completion_tokens": usage.completion_tokens,
            "prompt_tokens": usage.prompt_tokens,
            "total_tokens": usage.total_tokens,
        });

        if self.settings.include_llm_raw_output {
            if let Some(raw) = raw_llm_output {
                data["raw_llm_output"] =
                    json!(truncate_bytes(raw, self.settings.max_artifact_size_bytes));
            }
        }

        self.store_artifact("answer", data).await;
    }

    pub async fn log_response_artifact(
        &self,
        answer: &str,
        citations: &[CitationEntry],
        used_chunks: &[UsedChunk],
        metadata: &QueryGenerationMetadata,
    ) {
        if !self.settings.enabled {
            return;
        }

        let data = json!({
            "type": "response",
            "timestamp": now_iso(),
            "answer_preview": answer.chars().take(200).collect::<String>(),
            "citations_count": citations.len(),
            "used_chunks_count": used_chunks.len(),
            "total_latency_ms": metadata.total_latency_ms,
            "model": metadata.model,
            "chunks_retrieved": metadata.chunks_retrieved,
            "metadata": {
                "embedding_latency_ms": metadata.embedding_latency_ms,
                "retrieval_latency_ms": metadata.retrieval_latency_ms,
                "prompt_assembly_latency_ms": metadata.prompt_assembly_latency_ms,
                "generation_latency_ms": metadata.generation_latency_ms,
                "answer_processing_latency_ms": metadata.answer_processing_latency_ms,
            },
        });
        self.store_artifact("response", data).await;
    }
}
