use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::embedding::Embedding;
use crate::storage::{
    BatchStoreResult, MetadataFilters, StorageError, VectorStore,
};
use crate::utils::similarity::cosine_similarity;

#[derive(Default)]
struct MemoryInner {
    /// Embedding ids in insertion order; ties in similarity break on this.
    order: Vec<Uuid>,
    items: HashMap<Uuid, Embedding>,
}

/// In-memory reference implementation of the vector storage layer.
///
/// Upserts are keyed by `embedding_id`. Designed for tests and local
/// deployments without a database.
#[derive(Default)]
pub struct InMemoryVectorStore {
    inner: RwLock<MemoryInner>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches_filters(embedding: &Embedding, filters: Option<&MetadataFilters>) -> bool {
        let Some(filters) = filters else {
            return true;
        };
        filters.iter().all(|(key, value)| {
            if key.as_str() == "document_id" {
                return value.as_str() == Some(embedding.document_id.to_string().as_str());
            }
            embedding.metadata.matches(key, value)
        })
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn store_embedding(&self, embedding: Embedding) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        if !inner.items.contains_key(&embedding.embedding_id) {
            inner.order.push(embedding.embedding_id);
        }
        inner.items.insert(embedding.embedding_id, embedding);
        Ok(())
    }

    async fn store_embeddings_batch(
        &self,
        embeddings: Vec<Embedding>,
    ) -> Result<BatchStoreResult, StorageError> {
        let stored_count = embeddings.len();
        for embedding in embeddings {
            self.store_embedding(embedding).await?;
        }
        Ok(BatchStoreResult {
            stored_count,
            failed_count: 0,
            failures: Vec::new(),
        })
    }

    async fn search_by_similarity<'a>(
        &self,
        query: &[f32],
        top_k: usize,
        filters: Option<&'a MetadataFilters>,
    ) -> Result<Vec<Embedding>, StorageError> {
        let inner = self.inner.read().await;

        let mut scored: Vec<(f32, &Embedding)> = Vec::new();
        for id in &inner.order {
            let Some(embedding) = inner.items.get(id) else {
                continue;
            };
            if !Self::matches_filters(embedding, filters) {
                continue;
            }
            let score = cosine_similarity(query, &embedding.embedding);
            scored.push((score, embedding));
        }

        // Stable sort keeps insertion order for equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .filter(|(score, _)| *score > 0.0)
            .map(|(_, embedding)| embedding.clone())
            .collect())
    }

    async fn search_by_document(&self, document_id: Uuid) -> Result<Vec<Embedding>, StorageError> {
        let inner = self.inner.read().await;

        let mut results: Vec<Embedding> = inner
            .order
            .iter()
            .filter_map(|id| inner.items.get(id))
            .filter(|embedding| embedding.document_id == document_id)
            .cloned()
            .collect();

        if results.iter().all(|e| e.metadata.chunk_index.is_some()) {
            results.sort_by_key(|e| e.metadata.chunk_index.unwrap_or(0));
        }

        Ok(results)
    }

    async fn check_duplicate_content(
        &self,
        content: &str,
    ) -> Result<Option<Embedding>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.items.get(id))
            .find(|embedding| embedding.content == content)
            .cloned())
    }
}
