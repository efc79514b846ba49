pub mod job_store;
pub mod validator;

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde_json::json;
use uuid::Uuid;

use crate::chunking::ChunkingService;
use crate::embedding::EmbeddingService;
use crate::extract::TextExtractionService;
use crate::models::chunk::{ChunkingConfig, ChunkingStrategy};
use crate::models::embedding::BatchEmbeddingConfig;
use crate::models::ingestion::{
    DocumentMetadata, ErrorStage, IngestionConfig, IngestionJob, IngestionStatus,
};
use crate::storage::MetadataStore;
use crate::utils::error::ApiError;

pub use job_store::IngestionJobStore;
pub use validator::{FileValidationOutcome, FileValidator};

/// Token-based ingestion settings map to character-based chunking via a
/// coarse chars-per-token multiplier.
const APPROX_CHARS_PER_TOKEN: usize = 4;

/// Drives extraction → chunking → storage → embedding for one job.
///
/// Stage failures mark the job failed (with the failing stage) and return
/// the job record; they do not propagate as request errors.
pub struct IngestionOrchestrator {
    extraction_service: Arc<TextExtractionService>,
    chunking_service: ChunkingService,
    embedding_service: Option<Arc<EmbeddingService>>,
    job_store: Arc<IngestionJobStore>,
    metadata_store: Option<Arc<dyn MetadataStore>>,
    embed_defaults: BatchEmbeddingConfig,
}

impl IngestionOrchestrator {
    pub fn new(
        extraction_service: Arc<TextExtractionService>,
        embedding_service: Option<Arc<EmbeddingService>>,
        job_store: Arc<IngestionJobStore>,
        metadata_store: Option<Arc<dyn MetadataStore>>,
        embed_defaults: BatchEmbeddingConfig,
    ) -> Self {
        IngestionOrchestrator {
            extraction_service,
            chunking_service: ChunkingService::new(),
            embedding_service,
            job_store,
            metadata_store,
            embed_defaults,
        }
    }

    fn fail(
        &self,
        ingestion_id: Uuid,
        stage: ErrorStage,
        error: String,
    ) -> Result<IngestionJob, ApiError> {
        tracing::warn!(
            ingestion_id = %ingestion_id,
            stage = stage.as_str(),
            error = %error,
            "ingestion_stage_failed"
        );
        self.job_store
            .update_status(ingestion_id, IngestionStatus::Failed, Some(error), Some(stage));
        self.job_store
            .get_job(ingestion_id)
            .ok_or_else(|| ApiError::NotFound(format!("Ingestion job {ingestion_id} not found")))
    }

    /// Execute the pipeline for a job that already exists in the store.
    pub async fn ingest_and_store(
        &self,
        ingestion_id: Uuid,
        files: Vec<(String, Bytes)>,
        _document_metadata: DocumentMetadata,
        ingestion_config: IngestionConfig,
    ) -> Result<IngestionJob, ApiError> {
        let job = self
            .job_store
            .get_job(ingestion_id)
            .ok_or_else(|| ApiError::NotFound(format!("Ingestion job {ingestion_id} not found")))?;
        let document_id = job.document_id;

        // ------------------------------------------------------------------
        // Stage 1: Extraction
        // ------------------------------------------------------------------
        self.job_store
            .update_status(ingestion_id, IngestionStatus::Processing, None, None);
        tracing::info!(ingestion_id = %ingestion_id, "extraction_started");

        let Some((filename, content)) = files.into_iter().next() else {
            return self.fail(
                ingestion_id,
                ErrorStage::Extraction,
                "No files provided for ingestion".to_string(),
            );
        };

        let extraction_start = Instant::now();
        let extracted = match self
            .extraction_service
            .extract(&filename, &content, document_id)
            .await
        {
            Ok(document) => document,
            Err(err) => {
                return self.fail(ingestion_id, ErrorStage::Extraction, err.to_string());
            }
        };
        let extraction_duration_ms = extraction_start.elapsed().as_secs_f64() * 1000.0;

        self.job_store.update_metrics(
            ingestion_id,
            "extraction",
            extraction_duration_ms,
            vec![("pages".into(), json!(extracted.total_pages))],
        );
        self.job_store
            .attach_extracted_document(ingestion_id, extracted.clone());
        tracing::info!(
            ingestion_id = %ingestion_id,
            duration_ms = extraction_duration_ms,
            "extraction_completed"
        );

        // ------------------------------------------------------------------
        // Stage 2: Chunking
        // ------------------------------------------------------------------
        tracing::info!(ingestion_id = %ingestion_id, "chunking_started");

        let chunking_config = ChunkingConfig {
            strategy: ingestion_config
                .chunking_strategy
                .unwrap_or(ChunkingStrategy::Recursive),
            chunk_size_chars: ingestion_config.chunk_size_tokens * APPROX_CHARS_PER_TOKEN,
            chunk_overlap_chars: ingestion_config.chunk_overlap_tokens * APPROX_CHARS_PER_TOKEN,
            ..ChunkingConfig::default()
        };

        let chunk_result = match self
            .chunking_service
            .chunk_document(&extracted, &chunking_config)
        {
            Ok(result) => result,
            Err(err) => {
                return self.fail(ingestion_id, ErrorStage::Chunking, err.to_string());
            }
        };

        self.job_store.update_metrics(
            ingestion_id,
            "chunking",
            chunk_result.chunking_duration_ms,
            vec![("chunks".into(), json!(chunk_result.total_chunks))],
        );
        self.job_store
            .attach_chunks(ingestion_id, chunk_result.chunks);
        tracing::info!(
            ingestion_id = %ingestion_id,
            chunks = chunk_result.total_chunks,
            "chunking_completed"
        );

        // ------------------------------------------------------------------
        // Stage 3: Persist chunk metadata (when a metadata store exists)
        // ------------------------------------------------------------------
        if let Some(metadata_store) = &self.metadata_store {
            let job = self.job_store.get_job(ingestion_id).unwrap_or(job);
            if !job.chunks.is_empty() {
                tracing::info!(ingestion_id = %ingestion_id, "documents_chunks_persist_started");

                self.job_store.with_chunks_mut(ingestion_id, |chunks| {
                    for (index, chunk) in chunks.iter_mut().enumerate() {
                        chunk.metadata.chunk_index = Some(index);
                        chunk
                            .metadata
                            .user_id
                            .get_or_insert_with(|| "anonymous".to_string());
                    }
                });
                let chunks_snapshot = self
                    .job_store
                    .get_job(ingestion_id)
                    .map(|job| job.chunks)
                    .unwrap_or_default();

                let storage_start = Instant::now();
                let persist_result = metadata_store
                    .persist_document_chunks(
                        document_id,
                        &filename,
                        extracted.format.as_str(),
                        content.len(),
                        &chunks_snapshot,
                        &ingestion_config.embedding_model,
                    )
                    .await;
                let storage_duration_ms = storage_start.elapsed().as_secs_f64() * 1000.0;

                if let Err(err) = persist_result {
                    return self.fail(ingestion_id, ErrorStage::Storage, err.to_string());
                }

                self.job_store.update_metrics(
                    ingestion_id,
                    "storage",
                    storage_duration_ms,
                    vec![],
                );
                tracing::info!(
                    ingestion_id = %ingestion_id,
                    chunks = chunks_snapshot.len(),
                    "documents_chunks_persist_completed"
                );
            }
        }

        // ------------------------------------------------------------------
        // Stage 4: Embedding (when an embedding engine is configured)
        // ------------------------------------------------------------------
        if let Some(embedding_service) = &self.embedding_service {
            let mut chunks = self
                .job_store
                .get_job(ingestion_id)
                .map(|job| job.chunks)
                .unwrap_or_default();

            if !chunks.is_empty() {
                tracing::info!(ingestion_id = %ingestion_id, "embedding_started");

                let embed_config = BatchEmbeddingConfig {
                    batch_size: self.embed_defaults.batch_size.min(50),
                    model: ingestion_config.embedding_model.clone(),
                    skip_duplicate_content: true,
                    ..self.embed_defaults.clone()
                };

                let result = embedding_service
                    .embed_and_store(&mut chunks, &embed_config)
                    .await;

                // Push updated chunk flags back onto the job.
                self.job_store.attach_chunks(ingestion_id, chunks);

                if result.successful_embeddings == 0 && result.failed_embeddings > 0 {
                    let error = result
                        .failures
                        .first()
                        .map(|f| f.error.clone())
                        .unwrap_or_else(|| "embedding failed".to_string());

                    if let Some(metadata_store) = &self.metadata_store {
                        if let Err(err) =
                            metadata_store.mark_ingestion_status(document_id, "failed").await
                        {
                            tracing::warn!(error = %err, "ingestion_status_update_failed");
                        }
                    }
                    return self.fail(ingestion_id, ErrorStage::Embedding, error);
                }

                self.job_store.update_metrics(
                    ingestion_id,
                    "embedding",
                    result.embedding_duration_ms + result.storage_duration_ms,
                    vec![
                        ("tokens_used_estimate".into(), json!(result.tokens_used_estimate)),
                        ("duplicates_skipped".into(), json!(result.duplicates_skipped)),
                        (
                            "successful_embeddings".into(),
                            json!(result.successful_embeddings),
                        ),
                        ("failed_embeddings".into(), json!(result.failed_embeddings)),
                        (
                            "avg_embedding_quality_score".into(),
                            json!(result.avg_embedding_quality_score),
                        ),
                    ],
                );
                self.job_store
                    .attach_embeddings(ingestion_id, result.embeddings);
                tracing::info!(
                    ingestion_id = %ingestion_id,
                    embeddings = result.successful_embeddings,
                    "embedding_completed"
                );
            }
        }

        // ------------------------------------------------------------------
        // Completed
        // ------------------------------------------------------------------
        self.job_store
            .update_status(ingestion_id, IngestionStatus::Completed, None, None);
        if let Some(metadata_store) = &self.metadata_store {
            if let Err(err) = metadata_store
                .mark_ingestion_status(document_id, "completed")
                .await
            {
                tracing::warn!(error = %err, "ingestion_status_update_failed");
            }
        }

        let final_job = self
            .job_store
            .get_job(ingestion_id)
            .ok_or_else(|| ApiError::NotFound(format!("Ingestion job {ingestion_id} not found")))?;

        tracing::info!(
            ingestion_id = %ingestion_id,
            chunks = final_job.chunks_created(),
            embeddings = final_job.embeddings.len(),
            "ingestion_completed"
        );

        Ok(final_job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PdfPipelineConfig;
    use crate::embedding::provider::MockEmbeddingClient;
    use crate::embedding::{BatchEmbeddingProvider, EmbeddingService};
    use crate::storage::{InMemoryVectorStore, VectorStore};

    fn orchestrator(
        embedding_client: Option<MockEmbeddingClient>,
        store: Arc<InMemoryVectorStore>,
    ) -> (IngestionOrchestrator, Arc<IngestionJobStore>) {
        let job_store = Arc::new(IngestionJobStore::new());
        let extraction = Arc::new(TextExtractionService::new(PdfPipelineConfig::default()));

        let embedding_service = embedding_client.map(|client| {
            Arc::new(EmbeddingService::new(
                Arc::new(BatchEmbeddingProvider::new(Arc::new(client))),
                store,
            ))
        });

        (
            IngestionOrchestrator::new(
                extraction,
                embedding_service,
                job_store.clone(),
                None,
                test_embed_defaults(),
            ),
            job_store,
        )
    }

    fn test_embed_defaults() -> BatchEmbeddingConfig {
        BatchEmbeddingConfig {
            embedding_dimension: 3,
            max_retries: 1,
            base_backoff_seconds: 0.001,
            ..Default::default()
        }
    }

    fn embedding_client() -> MockEmbeddingClient {
        let mut client = MockEmbeddingClient::new();
        client
            .expect_embed_batch()
            .returning(|texts| Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect()));
        client
    }

    fn text_file(content: &str) -> Vec<(String, Bytes)> {
        vec![(
            "notes.txt".to_string(),
            Bytes::copy_from_slice(content.as_bytes()),
        )]
    }

    #[tokio::test]
    async fn successful_run_reaches_completed_with_full_progress() {
        let store = Arc::new(InMemoryVectorStore::new());
        let (orchestrator, job_store) = orchestrator(Some(embedding_client()), store.clone());

        let ingestion_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();
        job_store.create_job(ingestion_id, document_id, vec![]);

        let job = orchestrator
            .ingest_and_store(
                ingestion_id,
                text_file("some meaningful document content with enough words to chunk cleanly."),
                DocumentMetadata::default(),
                IngestionConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(job.status, IngestionStatus::Completed);
        assert!(job.chunks_created() >= 1);
        assert_eq!(job.progress_percent(), 100);
        assert!(job.chunks.iter().all(|c| c.has_valid_embedding));

        let stored = store.search_by_document(document_id).await.unwrap();
        assert_eq!(stored.len(), job.chunks_created());
    }

    #[tokio::test]
    async fn pipeline_without_embedding_completes() {
        let store = Arc::new(InMemoryVectorStore::new());
        let (orchestrator, job_store) = orchestrator(None, store);

        let ingestion_id = Uuid::new_v4();
        job_store.create_job(ingestion_id, Uuid::new_v4(), vec![]);

        let job = orchestrator
            .ingest_and_store(
                ingestion_id,
                text_file("plenty of words in this document to produce at least one chunk."),
                DocumentMetadata::default(),
                IngestionConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(job.status, IngestionStatus::Completed);
        assert!(job.chunks_created() >= 1);
        assert_eq!(job.progress_percent(), 100);
        assert!(job.metrics.contains_key("extraction_duration_ms"));
        assert!(job.metrics.contains_key("chunking_duration_ms"));
    }

    #[tokio::test]
    async fn empty_file_list_fails_at_extraction() {
        let store = Arc::new(InMemoryVectorStore::new());
        let (orchestrator, job_store) = orchestrator(None, store);

        let ingestion_id = Uuid::new_v4();
        job_store.create_job(ingestion_id, Uuid::new_v4(), vec![]);

        let job = orchestrator
            .ingest_and_store(
                ingestion_id,
                vec![],
                DocumentMetadata::default(),
                IngestionConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(job.status, IngestionStatus::Failed);
        assert_eq!(job.error_stage, Some(ErrorStage::Extraction));
        assert!(job.progress_percent() >= 50);
    }

    #[tokio::test]
    async fn unsupported_format_fails_at_extraction() {
        let store = Arc::new(InMemoryVectorStore::new());
        let (orchestrator, job_store) = orchestrator(None, store);

        let ingestion_id = Uuid::new_v4();
        job_store.create_job(ingestion_id, Uuid::new_v4(), vec![]);

        let job = orchestrator
            .ingest_and_store(
                ingestion_id,
                vec![("archive.zip".to_string(), Bytes::from_static(b"PK\x03\x04"))],
                DocumentMetadata::default(),
                IngestionConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(job.status, IngestionStatus::Failed);
        assert_eq!(job.error_stage, Some(ErrorStage::Extraction));
        assert!(job.error_message.as_deref().unwrap().contains("Unsupported"));
    }

    #[tokio::test]
    async fn provider_failure_marks_embedding_stage() {
        let mut client = MockEmbeddingClient::new();
        client.expect_embed_batch().returning(|_| {
            Err(crate::embedding::ProviderError::Http {
                status: 500,
                body: "provider down".into(),
            })
        });

        let store = Arc::new(InMemoryVectorStore::new());
        let job_store = Arc::new(IngestionJobStore::new());
        let extraction = Arc::new(TextExtractionService::new(PdfPipelineConfig::default()));
        let embedding_service = Arc::new(EmbeddingService::new(
            Arc::new(BatchEmbeddingProvider::new(Arc::new(client))),
            store,
        ));
        let orchestrator = IngestionOrchestrator::new(
            extraction,
            Some(embedding_service),
            job_store.clone(),
            None,
            test_embed_defaults(),
        );

        let ingestion_id = Uuid::new_v4();
        job_store.create_job(ingestion_id, Uuid::new_v4(), vec![]);

        let job = orchestrator
            .ingest_and_store(
                ingestion_id,
                text_file("document words that will fail to embed properly today, sadly."),
                DocumentMetadata::default(),
                IngestionConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(job.status, IngestionStatus::Failed);
        assert_eq!(job.error_stage, Some(ErrorStage::Embedding));
    }
}
