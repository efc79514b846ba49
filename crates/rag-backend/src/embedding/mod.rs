pub mod cache;
pub mod provider;
pub mod quality;

use std::sync::Arc;
use std::time::Instant;

use crate::models::chunk::Chunk;
use crate::models::embedding::{
    BatchEmbeddingConfig, EmbeddingFailure, EmbeddingInput, EmbeddingResult,
};
use crate::storage::VectorStore;

pub use cache::QueryEmbeddingCache;
pub use provider::{
    BatchEmbeddingProvider, EmbeddingClient, EmbeddingProviderError, OpenAiEmbeddingClient,
    ProviderError,
};

/// Embedding orchestration: duplicate suppression, provider calls with
/// retry, vector quality validation, and persistence.
pub struct EmbeddingService {
    provider: Arc<BatchEmbeddingProvider>,
    storage: Arc<dyn VectorStore>,
}

impl EmbeddingService {
    pub fn new(provider: Arc<BatchEmbeddingProvider>, storage: Arc<dyn VectorStore>) -> Self {
        EmbeddingService { provider, storage }
    }

    /// Embed the given chunks and store resulting embeddings.
    ///
    /// Mutates chunk flags along the way: duplicates get `is_duplicate`,
    /// chunks whose vectors pass validation get `has_valid_embedding`.
    pub async fn embed_and_store(
        &self,
        chunks: &mut [Chunk],
        config: &BatchEmbeddingConfig,
    ) -> EmbeddingResult {
        let total_inputs = chunks.len();
        if total_inputs == 0 {
            return EmbeddingResult::default();
        }

        tracing::info!(total_inputs, model = %config.model, "embedding_started");
        let start_total = Instant::now();

        // Duplicate suppression against previously stored content.
        let mut inputs: Vec<EmbeddingInput> = Vec::with_capacity(total_inputs);
        let mut duplicates_skipped = 0usize;
        let mut tokens_used_estimate = 0usize;

        for chunk in chunks.iter_mut() {
            if config.skip_duplicate_content {
                match self.storage.check_duplicate_content(&chunk.content).await {
                    Ok(Some(_)) => {
                        chunk.is_duplicate = true;
                        duplicates_skipped += 1;
                        continue;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "duplicate_check_failed");
                    }
                }
            }

            tokens_used_estimate += chunk.token_count;
            inputs.push(EmbeddingInput {
                chunk_id: chunk.chunk_id,
                document_id: chunk.document_id,
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                token_count: chunk.token_count,
                quality_score: chunk.quality_score,
            });
        }

        if inputs.is_empty() {
            return EmbeddingResult {
                total_inputs,
                duplicates_skipped,
                tokens_used_estimate,
                total_duration_ms: start_total.elapsed().as_secs_f64() * 1000.0,
                ..EmbeddingResult::default()
            };
        }

        // Provider call; a whole-batch failure marks every input failed
        // and skips storage entirely.
        let start_embed = Instant::now();
        let embeddings = match self.provider.embed_with_metadata(&inputs, config).await {
            Ok(embeddings) => embeddings,
            Err(err) => {
                let message = err.to_string();
                tracing::error!(error = %message, total_inputs, "embedding_failed");
                let failures = inputs
                    .iter()
                    .map(|input| EmbeddingFailure {
                        chunk_id: input.chunk_id,
                        error: message.clone(),
                        retry_count: err.attempts.saturating_sub(1),
                        stage: Some("provider".to_string()),
                        issues: Vec::new(),
                    })
                    .collect::<Vec<_>>();

                return EmbeddingResult {
                    total_inputs,
                    total_batches: 1,
                    successful_embeddings: 0,
                    failed_embeddings: failures.len(),
                    embeddings: Vec::new(),
                    failures,
                    embedding_duration_ms: start_embed.elapsed().as_secs_f64() * 1000.0,
                    storage_duration_ms: 0.0,
                    total_duration_ms: start_total.elapsed().as_secs_f64() * 1000.0,
                    tokens_used_estimate,
                    duplicates_skipped,
                    avg_embedding_quality_score: 0.0,
                };
            }
        };
        let embedding_duration_ms = start_embed.elapsed().as_secs_f64() * 1000.0;

        // Validate vectors and flag source chunks.
        let mut failures: Vec<EmbeddingFailure> = Vec::new();
        let mut valid_embeddings = Vec::with_capacity(embeddings.len());

        for mut embedding in embeddings {
            let report =
                quality::validate_embedding(&embedding.embedding, config.embedding_dimension);
            embedding.embedding_quality_score = report.quality_score;

            if !report.is_valid {
                failures.push(EmbeddingFailure {
                    chunk_id: embedding.chunk_id,
                    error: "invalid_embedding".to_string(),
                    retry_count: 0,
                    stage: Some("validation".to_string()),
                    issues: report.issues,
                });
                continue;
            }

            if let Some(chunk) = chunks
                .iter_mut()
                .find(|chunk| chunk.chunk_id == embedding.chunk_id)
            {
                chunk.has_valid_embedding = true;
            }
            valid_embeddings.push(embedding);
        }

        // Persist valid embeddings.
        let start_store = Instant::now();
        let storage_result = match self
            .storage
            .store_embeddings_batch(valid_embeddings.clone())
            .await
        {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, "embedding_storage_failed");
                crate::storage::BatchStoreResult {
                    stored_count: 0,
                    failed_count: valid_embeddings.len(),
                    failures: valid_embeddings
                        .iter()
                        .map(|embedding| crate::storage::BatchStoreFailure {
                            chunk_id: embedding.chunk_id,
                            error: err.to_string(),
                        })
                        .collect(),
                }
            }
        };
        let storage_duration_ms = start_store.elapsed().as_secs_f64() * 1000.0;

        for failure in &storage_result.failures {
            failures.push(EmbeddingFailure {
                chunk_id: failure.chunk_id,
                error: failure.error.clone(),
                retry_count: 0,
                stage: Some("storage".to_string()),
                issues: Vec::new(),
            });
        }

        let avg_embedding_quality_score = if valid_embeddings.is_empty() {
            0.0
        } else {
            valid_embeddings
                .iter()
                .map(|e| e.embedding_quality_score)
                .sum::<f32>()
                / valid_embeddings.len() as f32
        };

        let successful_embeddings = storage_result.stored_count;
        let failed_embeddings = failures.len();
        let total_duration_ms = start_total.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(
            total_inputs,
            successful_embeddings,
            failed_embeddings,
            duration_ms = total_duration_ms,
            "embedding_completed"
        );

        EmbeddingResult {
            total_inputs,
            total_batches: 1,
            successful_embeddings,
            failed_embeddings,
            embeddings: valid_embeddings,
            failures,
            embedding_duration_ms,
            storage_duration_ms,
            total_duration_ms,
            tokens_used_estimate,
            duplicates_skipped,
            avg_embedding_quality_score,
        }
    }
}
