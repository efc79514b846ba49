pub mod answer;
pub mod generation;
pub mod llm;
pub mod prompt;
pub mod retriever;

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::embedding::{BatchEmbeddingProvider, QueryEmbeddingCache};
use crate::models::embedding::BatchEmbeddingConfig;
use crate::models::query::{QueryMetrics, QueryOutcome};
use crate::storage::MetadataFilters;
use crate::utils::error::ApiError;

pub use answer::AnswerProcessor;
pub use generation::GenerationOrchestrator;
pub use prompt::PromptAssembler;
pub use retriever::RetrieverService;

/// Orchestrates query embedding (with cache) and similarity retrieval.
pub struct QueryOrchestrator {
    provider: Arc<BatchEmbeddingProvider>,
    retriever: RetrieverService,
    cache: QueryEmbeddingCache,
    embed_config: BatchEmbeddingConfig,
    cache_enabled: bool,
}

impl QueryOrchestrator {
    pub fn new(
        provider: Arc<BatchEmbeddingProvider>,
        retriever: RetrieverService,
        cache: QueryEmbeddingCache,
        embed_config: BatchEmbeddingConfig,
    ) -> Self {
        QueryOrchestrator {
            provider,
            retriever,
            cache,
            embed_config,
            cache_enabled: true,
        }
    }

    /// Execute the embed → retrieve pipeline for a single query.
    pub async fn query(
        &self,
        query_text: &str,
        top_k: usize,
        filters: Option<&MetadataFilters>,
    ) -> Result<QueryOutcome, ApiError> {
        let query_id = Uuid::new_v4();
        let start_total = Instant::now();

        // Stage: embed query, consulting the advisory cache first.
        let start_embed = Instant::now();
        let (query_embedding, cache_hit) = match self.cache.get(query_text) {
            Some(embedding) if self.cache_enabled => (embedding, true),
            _ => {
                let embedding = self
                    .provider
                    .embed_query(query_text, &self.embed_config)
                    .await?;
                if self.cache_enabled {
                    self.cache.set(query_text, &embedding);
                }
                (embedding, false)
            }
        };
        let embedding_latency_ms = start_embed.elapsed().as_secs_f64() * 1000.0;

        // Stage: similarity retrieval.
        let start_retrieve = Instant::now();
        let retrieved_chunks = self
            .retriever
            .retrieve(&query_embedding, top_k, filters)
            .await?;
        let retrieval_latency_ms = start_retrieve.elapsed().as_secs_f64() * 1000.0;

        let total_latency_ms = start_total.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(
            query_id = %query_id,
            top_k,
            result_count = retrieved_chunks.len(),
            latency_ms = total_latency_ms,
            cache_hit,
            "query_completed"
        );

        Ok(QueryOutcome {
            query_id,
            query_text: query_text.to_string(),
            query_embedding,
            metrics: QueryMetrics {
                embedding_latency_ms,
                retrieval_latency_ms,
                total_latency_ms,
                total_results_available: retrieved_chunks.len(),
                embedding_cache_enabled: self.cache_enabled,
                embedding_cache_hit: cache_hit,
            },
            retrieved_chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::provider::MockEmbeddingClient;
    use crate::storage::InMemoryVectorStore;

    fn orchestrator(client: MockEmbeddingClient) -> QueryOrchestrator {
        let storage = Arc::new(InMemoryVectorStore::new());
        QueryOrchestrator::new(
            Arc::new(BatchEmbeddingProvider::new(Arc::new(client))),
            RetrieverService::new(storage),
            QueryEmbeddingCache::default(),
            BatchEmbeddingConfig {
                embedding_dimension: 2,
                base_backoff_seconds: 0.001,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn cache_hit_skips_the_provider() {
        let mut client = MockEmbeddingClient::new();
        // Exactly one provider call for two identical queries.
        client
            .expect_embed_batch()
            .times(1)
            .returning(|texts| Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect()));

        let orchestrator = orchestrator(client);

        let first = orchestrator.query("repeated question", 5, None).await.unwrap();
        assert!(!first.metrics.embedding_cache_hit);
        assert!(first.metrics.embedding_cache_enabled);

        let second = orchestrator.query("repeated question", 5, None).await.unwrap();
        assert!(second.metrics.embedding_cache_hit);
        assert_eq!(second.query_embedding, first.query_embedding);
    }

    #[tokio::test]
    async fn empty_store_returns_no_chunks() {
        let mut client = MockEmbeddingClient::new();
        client
            .expect_embed_batch()
            .returning(|texts| Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect()));

        let orchestrator = orchestrator(client);
        let outcome = orchestrator.query("anything", 10, None).await.unwrap();
        assert!(outcome.retrieved_chunks.is_empty());
        assert_eq!(outcome.metrics.total_results_available, 0);
    }
}
