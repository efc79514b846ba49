use std::sync::Arc;

use crate::models::query::RetrievedChunk;
use crate::storage::{MetadataFilters, StorageError, VectorStore};
use crate::utils::similarity::cosine_similarity;

/// Dense similarity retrieval over the vector storage layer.
///
/// Re-scores each candidate's stored vector against the query vector,
/// assigns dense ranks, and clips similarity into [0, 1].
pub struct RetrieverService {
    storage: Arc<dyn VectorStore>,
}

impl RetrieverService {
    pub fn new(storage: Arc<dyn VectorStore>) -> Self {
        RetrieverService { storage }
    }

    pub async fn retrieve(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filters: Option<&MetadataFilters>,
    ) -> Result<Vec<RetrievedChunk>, StorageError> {
        let embeddings = self
            .storage
            .search_by_similarity(query_embedding, top_k, filters)
            .await?;

        tracing::info!(top_k, result_count = embeddings.len(), "retrieval_completed");

        Ok(embeddings
            .into_iter()
            .enumerate()
            .map(|(index, embedding)| {
                let similarity =
                    cosine_similarity(query_embedding, &embedding.embedding).clamp(0.0, 1.0);
                RetrievedChunk {
                    chunk_id: embedding.chunk_id,
                    content: embedding.content,
                    similarity_score: similarity,
                    rank: index as u32 + 1,
                    retrieval_method: "dense".to_string(),
                    document_id: Some(embedding.document_id),
                    metadata: embedding.metadata,
                    quality_score: Some(embedding.quality_score),
                    embedding: Some(embedding.embedding),
                    embedding_model: Some(embedding.embedding_model),
                    created_at: Some(embedding.created_at),
                    updated_at: Some(embedding.updated_at),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chunk::{ChunkMetadata, PositionRange};
    use crate::models::embedding::Embedding;
    use crate::storage::{InMemoryVectorStore, VectorStore};
    use chrono::Utc;
    use uuid::Uuid;

    fn embedding(content: &str, vector: Vec<f32>) -> Embedding {
        let dimension = vector.len();
        Embedding {
            embedding_id: Uuid::new_v4(),
            chunk_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            content: content.to_string(),
            embedding: vector,
            embedding_model: "text-embedding-3-small".into(),
            embedding_dimension: dimension,
            metadata: ChunkMetadata {
                page_number: 0,
                position_in_page: PositionRange { start: 0, end: 1 },
                section_title: None,
                document_type: None,
                source_filename: None,
                language: None,
                chunk_index: None,
                user_id: None,
                attributes: Default::default(),
            },
            quality_score: 0.4,
            embedding_quality_score: 1.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn ranks_are_dense_and_similarity_monotonic() {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .store_embedding(embedding("best", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .store_embedding(embedding("middle", vec![0.7, 0.7]))
            .await
            .unwrap();
        store
            .store_embedding(embedding("worst", vec![0.1, 1.0]))
            .await
            .unwrap();

        let retriever = RetrieverService::new(store);
        let results = retriever.retrieve(&[1.0, 0.0], 10, None).await.unwrap();

        assert_eq!(results.len(), 3);
        for (i, chunk) in results.iter().enumerate() {
            assert_eq!(chunk.rank, i as u32 + 1);
            assert!((0.0..=1.0).contains(&chunk.similarity_score));
        }
        for pair in results.windows(2) {
            assert!(pair[0].similarity_score >= pair[1].similarity_score);
        }
    }

    #[tokio::test]
    async fn respects_top_k() {
        let store = Arc::new(InMemoryVectorStore::new());
        for i in 0..5 {
            store
                .store_embedding(embedding(&format!("c{i}"), vec![1.0, i as f32 * 0.01]))
                .await
                .unwrap();
        }
        let retriever = RetrieverService::new(store);
        let results = retriever.retrieve(&[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(results.len(), 2);
    }
}
