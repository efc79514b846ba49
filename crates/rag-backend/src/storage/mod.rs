pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::chunk::Chunk;
use crate::models::embedding::Embedding;
use crate::utils::error::ApiError;

pub use memory::InMemoryVectorStore;
pub use postgres::PgVectorStore;

/// Metadata filters applied during similarity search: every key/value must
/// match for an embedding to be considered.
pub type MetadataFilters = HashMap<String, Value>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Database(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct BatchStoreFailure {
    pub chunk_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchStoreResult {
    pub stored_count: usize,
    pub failed_count: usize,
    pub failures: Vec<BatchStoreFailure>,
}

/// Storage layer for embeddings: persist, deduplicate, and similarity
/// search under optional metadata filters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotent upsert of one embedding.
    async fn store_embedding(&self, embedding: Embedding) -> Result<(), StorageError>;

    async fn store_embeddings_batch(
        &self,
        embeddings: Vec<Embedding>,
    ) -> Result<BatchStoreResult, StorageError>;

    /// Up to `top_k` embeddings matching all filters, ordered by
    /// descending cosine similarity against `query`. Results with
    /// similarity <= 0 (including dimension mismatches) are excluded.
    async fn search_by_similarity<'a>(
        &self,
        query: &[f32],
        top_k: usize,
        filters: Option<&'a MetadataFilters>,
    ) -> Result<Vec<Embedding>, StorageError>;

    /// All embeddings for one document, in chunk-index order when known.
    async fn search_by_document(&self, document_id: Uuid) -> Result<Vec<Embedding>, StorageError>;

    /// Exact-content lookup of a previously stored embedding.
    async fn check_duplicate_content(
        &self,
        content: &str,
    ) -> Result<Option<Embedding>, StorageError>;
}

/// Document/chunk metadata persistence used by ingestion stage 3. The
/// Postgres store implements this alongside `VectorStore`; in-memory
/// deployments run without one.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn persist_document_chunks(
        &self,
        document_id: Uuid,
        filename: &str,
        document_type: &str,
        file_size: usize,
        chunks: &[Chunk],
        embedding_model: &str,
    ) -> Result<(), StorageError>;

    async fn mark_ingestion_status(
        &self,
        document_id: Uuid,
        status: &str,
    ) -> Result<(), StorageError>;
}
