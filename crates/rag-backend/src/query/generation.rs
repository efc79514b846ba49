use std::sync::Arc;
use std::time::Instant;

use crate::artifacts::ArtifactLogger;
use crate::guardrails::{InputValidator, TimeoutManager};
use crate::models::generation::{
    QueryGenerationMetadata, QueryGenerationRequest, QueryGenerationResponse,
};
use crate::models::prompt::PromptRequest;
use crate::query::answer::AnswerProcessor;
use crate::query::llm::LlmClient;
use crate::query::prompt::PromptAssembler;
use crate::query::QueryOrchestrator;
use crate::utils::error::ApiError;

const MIN_STAGE_SECONDS: f64 = 1.0;

/// Coordinates the full validate → embed → retrieve → prompt → generate →
/// post-process pipeline under one global deadline.
pub struct GenerationOrchestrator {
    query_orchestrator: Arc<QueryOrchestrator>,
    prompt_assembler: PromptAssembler,
    llm_client: Arc<dyn LlmClient>,
    answer_processor: AnswerProcessor,
    artifact_logger: Arc<ArtifactLogger>,
    model: String,
}

impl GenerationOrchestrator {
    pub fn new(
        query_orchestrator: Arc<QueryOrchestrator>,
        llm_client: Arc<dyn LlmClient>,
        artifact_logger: Arc<ArtifactLogger>,
        model: String,
    ) -> Self {
        GenerationOrchestrator {
            query_orchestrator,
            prompt_assembler: PromptAssembler::new(),
            llm_client,
            answer_processor: AnswerProcessor::new(),
            artifact_logger,
            model,
        }
    }

    /// Execute the full generation pipeline for one query. Each stage
    /// asserts remaining deadline budget before starting.
    pub async fn generate_answer(
        &self,
        request: &QueryGenerationRequest,
        timeout: &TimeoutManager,
    ) -> Result<QueryGenerationResponse, ApiError> {
        // Stage 1: validation.
        InputValidator::validate_request(&request.query, request.top_k)?;
        self.artifact_logger
            .log_query_artifact(&request.query, request.top_k, request.filters.as_ref())
            .await;

        // Stage 2: embed + retrieve.
        timeout.assert_time_available(MIN_STAGE_SECONDS, "stage_1_retrieval", 0)?;
        let query_outcome = self
            .query_orchestrator
            .query(&request.query, request.top_k, request.filters.as_ref())
            .await?;
        self.artifact_logger
            .log_retrieved_chunks_artifact(
                &query_outcome.retrieved_chunks,
                query_outcome.metrics.retrieval_latency_ms,
            )
            .await;

        // Stage 3: prompt construction.
        timeout.assert_time_available(MIN_STAGE_SECONDS, "stage_2_prompt_construction", 1)?;
        let mut prompt_request = PromptRequest::new(
            request.query.clone(),
            query_outcome.retrieved_chunks.clone(),
            self.model.clone(),
        );
        prompt_request.include_sources = request.include_sources;

        let prompt_response = self.prompt_assembler.construct_prompt(&prompt_request)?;
        self.artifact_logger
            .log_prompt_artifact(
                &prompt_response.system_message,
                &prompt_response.user_message,
                &prompt_response.token_metrics,
                &prompt_response.citation_map,
            )
            .await;

        // Stage 4: LLM generation.
        timeout.assert_time_available(MIN_STAGE_SECONDS, "stage_3_generation", 2)?;
        let generation = self
            .llm_client
            .generate(
                &prompt_response.system_message,
                &prompt_response.user_message,
                prompt_request.max_tokens_for_response as u32,
            )
            .await
            .map_err(ApiError::from)?;
        self.artifact_logger
            .log_answer_artifact(
                &generation.content,
                Some(generation.content.as_str()),
                generation.latency_ms,
                &generation.model,
                &generation.usage,
            )
            .await;

        // Stage 5: answer post-processing.
        timeout.assert_time_available(MIN_STAGE_SECONDS, "stage_4_answer_processing", 3)?;
        let start_processing = Instant::now();
        let processed = self.answer_processor.process(
            &generation.content,
            &prompt_response.citation_map,
            &query_outcome.retrieved_chunks,
        );
        let answer_processing_latency_ms = start_processing.elapsed().as_secs_f64() * 1000.0;

        for warning in &processed.warnings {
            tracing::warn!(warning = %warning, "citation_validation_warning");
        }

        let stage_1_latency = query_outcome.metrics.embedding_latency_ms
            + query_outcome.metrics.retrieval_latency_ms;
        timeout.log_stage_timing("stage_1_retrieval", stage_1_latency);
        timeout.log_stage_timing(
            "stage_2_prompt_construction",
            prompt_response.assembly_latency_ms,
        );
        timeout.log_stage_timing("stage_3_generation", generation.latency_ms);
        timeout.log_stage_timing("stage_4_answer_processing", answer_processing_latency_ms);

        let metadata = QueryGenerationMetadata {
            total_latency_ms: timeout.elapsed_ms(),
            embedding_latency_ms: query_outcome.metrics.embedding_latency_ms,
            retrieval_latency_ms: query_outcome.metrics.retrieval_latency_ms,
            prompt_assembly_latency_ms: prompt_response.assembly_latency_ms,
            generation_latency_ms: generation.latency_ms,
            answer_processing_latency_ms,
            total_tokens_used: generation.usage.total_tokens,
            model: generation.model.clone(),
            chunks_retrieved: query_outcome.retrieved_chunks.len(),
        };

        self.artifact_logger
            .log_response_artifact(
                &processed.answer,
                &processed.citations,
                &processed.used_chunks,
                &metadata,
            )
            .await;

        Ok(QueryGenerationResponse {
            query_id: query_outcome.query_id,
            answer: processed.answer,
            citations: processed.citations,
            used_chunks: processed.used_chunks,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactLogger, ArtifactStore, InMemoryArtifactStore};
    use crate::config::DebugConfig;
    use crate::embedding::provider::MockEmbeddingClient;
    use crate::embedding::{BatchEmbeddingProvider, QueryEmbeddingCache};
    use crate::models::chunk::{Chunk, ChunkMetadata, PositionRange};
    use crate::models::document::FileFormat;
    use crate::models::embedding::BatchEmbeddingConfig;
    use crate::query::llm::{GenerationOutcome, MockLlmClient, TokenUsage};
    use crate::query::RetrieverService;
    use crate::storage::{InMemoryVectorStore, VectorStore};
    use uuid::Uuid;

    fn debug_config(enabled: bool) -> DebugConfig {
        DebugConfig {
            enabled,
            retention_hours: 24,
            max_artifact_size_bytes: 100_000,
            artifacts_token: None,
            include_chunk_content: true,
            include_prompt_details: true,
            include_llm_raw_output: true,
        }
    }

    async fn seeded_store() -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        let chunk = Chunk::from_content(
            "hello world reference content".into(),
            Uuid::new_v4(),
            ChunkMetadata {
                page_number: 0,
                position_in_page: PositionRange { start: 0, end: 29 },
                section_title: None,
                document_type: Some(FileFormat::Txt),
                source_filename: Some("hello.txt".into()),
                language: Some("en".into()),
                chunk_index: Some(0),
                user_id: None,
                attributes: Default::default(),
            },
        );
        store
            .store_embedding(crate::models::embedding::Embedding {
                embedding_id: Uuid::new_v4(),
                chunk_id: chunk.chunk_id,
                document_id: chunk.document_id,
                content: chunk.content.clone(),
                embedding: vec![1.0, 0.0],
                embedding_model: "text-embedding-3-small".into(),
                embedding_dimension: 2,
                metadata: chunk.metadata.clone(),
                quality_score: chunk.quality_score,
                embedding_quality_score: 1.0,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        store
    }

    fn orchestrator_with(
        store: Arc<InMemoryVectorStore>,
        llm: MockLlmClient,
        debug_enabled: bool,
    ) -> (GenerationOrchestrator, Arc<InMemoryArtifactStore>) {
        let mut embed_client = MockEmbeddingClient::new();
        embed_client
            .expect_embed_batch()
            .returning(|texts| Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect()));

        let query_orchestrator = Arc::new(QueryOrchestrator::new(
            Arc::new(BatchEmbeddingProvider::new(Arc::new(embed_client))),
            RetrieverService::new(store),
            QueryEmbeddingCache::default(),
            BatchEmbeddingConfig {
                embedding_dimension: 2,
                base_backoff_seconds: 0.001,
                ..Default::default()
            },
        ));

        let artifact_store = Arc::new(InMemoryArtifactStore::new());
        let logger = Arc::new(ArtifactLogger::new(
            debug_config(debug_enabled),
            artifact_store.clone(),
        ));

        (
            GenerationOrchestrator::new(
                query_orchestrator,
                Arc::new(llm),
                logger,
                "gpt-5-nano".into(),
            ),
            artifact_store,
        )
    }

    fn answering_llm(answer: &'static str) -> MockLlmClient {
        let mut llm = MockLlmClient::new();
        llm.expect_generate().returning(move |_, _, _| {
            Ok(GenerationOutcome {
                content: answer.to_string(),
                model: "gpt-5-nano".into(),
                usage: TokenUsage {
                    prompt_tokens: 50,
                    completion_tokens: 20,
                    total_tokens: 70,
                },
                finish_reason: Some("stop".into()),
                latency_ms: 5.0,
            })
        });
        llm
    }

    #[tokio::test]
    async fn full_pipeline_produces_cited_answer() {
        let store = seeded_store().await;
        let (orchestrator, _) =
            orchestrator_with(store, answering_llm("The answer is here [Source 1]."), false);

        let request = QueryGenerationRequest {
            query: "what does the document say?".into(),
            top_k: 5,
            filters: None,
            include_sources: true,
        };
        let response = orchestrator
            .generate_answer(&request, &TimeoutManager::new(30))
            .await
            .unwrap();

        assert!(response.answer.contains("[Source 1]"));
        assert_eq!(response.citations.len(), 1);
        assert_eq!(response.used_chunks.len(), 1);
        assert_eq!(response.metadata.total_tokens_used, 70);
        assert_eq!(response.metadata.chunks_retrieved, 1);
    }

    #[tokio::test]
    async fn empty_query_fails_validation() {
        let store = seeded_store().await;
        let (orchestrator, _) = orchestrator_with(store, MockLlmClient::new(), false);

        let request = QueryGenerationRequest {
            query: "   ".into(),
            top_k: 5,
            filters: None,
            include_sources: true,
        };
        let err = orchestrator
            .generate_answer(&request, &TimeoutManager::new(30))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "validation");
    }

    #[tokio::test]
    async fn out_of_range_top_k_fails_validation() {
        let store = seeded_store().await;
        let (orchestrator, _) = orchestrator_with(store, MockLlmClient::new(), false);

        let request = QueryGenerationRequest {
            query: "valid query".into(),
            top_k: 0,
            filters: None,
            include_sources: true,
        };
        let err = orchestrator
            .generate_answer(&request, &TimeoutManager::new(30))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "validation");
    }

    #[tokio::test]
    async fn artifacts_are_logged_for_every_stage() {
        let store = seeded_store().await;
        let (orchestrator, artifact_store) =
            orchestrator_with(store, answering_llm("Cited [Source 1]."), true);

        let request = QueryGenerationRequest {
            query: "hello world".into(),
            top_k: 5,
            filters: None,
            include_sources: true,
        };

        crate::guardrails::TraceContext::new(Some("gen-trace".into()))
            .scope(async {
                orchestrator
                    .generate_answer(&request, &TimeoutManager::new(30))
                    .await
                    .unwrap();
            })
            .await;

        let records = artifact_store.get_by_trace_id("gen-trace").await.unwrap();
        let types: Vec<&str> = records.iter().map(|r| r.artifact_type.as_str()).collect();
        assert_eq!(
            types,
            vec!["query", "retrieved_chunks", "prompt", "answer", "response"]
        );
    }
}
