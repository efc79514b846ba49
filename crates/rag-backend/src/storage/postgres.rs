use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::models::chunk::{Chunk, ChunkMetadata, PositionRange};
use crate::models::document::FileFormat;
use crate::models::embedding::Embedding;
use crate::storage::{
    BatchStoreFailure, BatchStoreResult, MetadataFilters, MetadataStore, StorageError, VectorStore,
};

/// Filter keys supported as schema columns by the SQL backend.
const FILTER_COLUMNS: [&str; 3] = ["user_id", "document_type", "language"];

const CHUNK_COLUMNS: &str = "id, document_id, chunk_index, content, embedding, embedding_model, \
     quality_score, embedding_quality_score, source, document_type, language, page_number, \
     section_title, user_id, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ChunkRow {
    id: Uuid,
    document_id: Uuid,
    chunk_index: i32,
    content: String,
    embedding: Option<Vector>,
    embedding_model: Option<String>,
    quality_score: Option<f32>,
    embedding_quality_score: Option<f32>,
    source: Option<String>,
    document_type: Option<String>,
    language: Option<String>,
    page_number: Option<i32>,
    section_title: Option<String>,
    user_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChunkRow> for Embedding {
    fn from(row: ChunkRow) -> Self {
        let vector = row.embedding.map(|v| v.to_vec()).unwrap_or_default();
        let dimension = vector.len();
        Embedding {
            embedding_id: row.id,
            chunk_id: row.id,
            document_id: row.document_id,
            content: row.content,
            embedding: vector,
            embedding_model: row
                .embedding_model
                .unwrap_or_else(|| crate::models::embedding::STANDARD_EMBEDDING_MODEL.to_string()),
            embedding_dimension: dimension,
            metadata: ChunkMetadata {
                page_number: row.page_number.unwrap_or(0).max(0) as u32,
                position_in_page: PositionRange { start: 0, end: 0 },
                section_title: row.section_title,
                document_type: row.document_type.as_deref().and_then(FileFormat::parse),
                source_filename: row.source,
                language: row.language,
                chunk_index: Some(row.chunk_index.max(0) as usize),
                user_id: row.user_id,
                attributes: Default::default(),
            },
            quality_score: row.quality_score.unwrap_or(0.0),
            embedding_quality_score: row.embedding_quality_score.unwrap_or(0.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Connect a pool for the SQL-backed stores.
pub async fn connect_pool(url: &str, max_size: u32) -> Result<PgPool, StorageError> {
    Ok(PgPoolOptions::new()
        .max_connections(max_size)
        .connect(url)
        .await?)
}

/// Postgres/pgvector-backed vector storage.
///
/// Chunk rows are upserted by `chunk_id`; similarity search uses cosine
/// distance (`<=>`) ordering so results align with the in-memory cosine
/// ranking.
pub struct PgVectorStore {
    pool: PgPool,
}

impl PgVectorStore {
    pub fn new(pool: PgPool) -> Self {
        PgVectorStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn upsert_chunk_row(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        embedding: &Embedding,
        chunk_index: i32,
    ) -> Result<(), sqlx::Error> {
        let metadata = &embedding.metadata;
        let source = metadata.source_filename.clone();

        sqlx::query(
            r#"INSERT INTO documents (id, filename, ingestion_status)
               VALUES ($1, $2, 'processing')
               ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(embedding.document_id)
        .bind(source.clone().unwrap_or_else(|| "unknown".to_string()))
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO chunks (
                   id, document_id, chunk_index, content, original_content,
                   embedding_model, embedding, source, document_type, language,
                   page_number, section_title, user_id, quality_score,
                   embedding_quality_score, is_duplicate
               ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
               ON CONFLICT (id) DO UPDATE SET
                   content = EXCLUDED.content,
                   original_content = EXCLUDED.original_content,
                   embedding_model = EXCLUDED.embedding_model,
                   embedding = EXCLUDED.embedding,
                   source = EXCLUDED.source,
                   document_type = EXCLUDED.document_type,
                   language = EXCLUDED.language,
                   page_number = EXCLUDED.page_number,
                   section_title = EXCLUDED.section_title,
                   user_id = EXCLUDED.user_id,
                   quality_score = EXCLUDED.quality_score,
                   embedding_quality_score = EXCLUDED.embedding_quality_score,
                   is_duplicate = EXCLUDED.is_duplicate,
                   updated_at = NOW()"#,
        )
        .bind(embedding.chunk_id)
        .bind(embedding.document_id)
        .bind(chunk_index)
        .bind(&embedding.content)
        .bind(&embedding.content)
        .bind(&embedding.embedding_model)
        .bind(Vector::from(embedding.embedding.clone()))
        .bind(source)
        .bind(metadata.document_type.map(|f| f.as_str().to_string()))
        .bind(metadata.language.clone())
        .bind(metadata.page_number as i32)
        .bind(metadata.section_title.clone())
        .bind(
            metadata
                .user_id
                .clone()
                .unwrap_or_else(|| "anonymous".to_string()),
        )
        .bind(embedding.quality_score)
        .bind(embedding.embedding_quality_score)
        .bind(false)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn store_embedding(&self, embedding: Embedding) -> Result<(), StorageError> {
        let result = self.store_embeddings_batch(vec![embedding]).await?;
        if result.stored_count == 1 {
            Ok(())
        } else {
            Err(StorageError::Database(
                result
                    .failures
                    .first()
                    .map(|f| f.error.clone())
                    .unwrap_or_else(|| "store_embedding failed".to_string()),
            ))
        }
    }

    async fn store_embeddings_batch(
        &self,
        embeddings: Vec<Embedding>,
    ) -> Result<BatchStoreResult, StorageError> {
        if embeddings.is_empty() {
            return Ok(BatchStoreResult::default());
        }

        let mut tx = self.pool.begin().await?;
        let mut next_index_by_doc: std::collections::HashMap<Uuid, i32> = Default::default();

        for embedding in &embeddings {
            let chunk_index = match embedding.metadata.chunk_index {
                Some(index) => index as i32,
                None => {
                    let next = next_index_by_doc.entry(embedding.document_id).or_insert(0);
                    let assigned = *next;
                    *next += 1;
                    assigned
                }
            };

            if let Err(err) = Self::upsert_chunk_row(&mut tx, embedding, chunk_index).await {
                // The whole transaction is rolled back; report the failing
                // chunk so the caller can account for the batch.
                tx.rollback().await.ok();
                return Ok(BatchStoreResult {
                    stored_count: 0,
                    failed_count: embeddings.len(),
                    failures: vec![BatchStoreFailure {
                        chunk_id: embedding.chunk_id,
                        error: err.to_string(),
                    }],
                });
            }
        }

        tx.commit().await?;

        Ok(BatchStoreResult {
            stored_count: embeddings.len(),
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
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE embedding IS NOT NULL"
        ));

        if let Some(filters) = filters {
            for (key, value) in filters {
                match key.as_str() {
                    "document_id" => {
                        if let Some(id) = value.as_str().and_then(|s| Uuid::parse_str(s).ok()) {
                            builder.push(" AND document_id = ");
                            builder.push_bind(id);
                        }
                    }
                    "page_number" => {
                        if let Some(number) = value.as_i64() {
                            builder.push(" AND page_number = ");
                            builder.push_bind(number as i32);
                        }
                    }
                    key if FILTER_COLUMNS.contains(&key) => {
                        if let Some(text) = value.as_str() {
                            builder.push(format!(" AND {key} = "));
                            builder.push_bind(text.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        builder.push(" ORDER BY embedding <=> ");
        builder.push_bind(Vector::from(query.to_vec()));
        builder.push(" LIMIT ");
        builder.push_bind(top_k as i64);

        let rows: Vec<ChunkRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Embedding::from).collect())
    }

    async fn search_by_document(&self, document_id: Uuid) -> Result<Vec<Embedding>, StorageError> {
        let rows: Vec<ChunkRow> = sqlx::query_as(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks \
             WHERE document_id = $1 AND embedding IS NOT NULL \
             ORDER BY chunk_index ASC"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Embedding::from).collect())
    }

    async fn check_duplicate_content(
        &self,
        content: &str,
    ) -> Result<Option<Embedding>, StorageError> {
        if content.is_empty() {
            return Ok(None);
        }

        let row: Option<ChunkRow> = sqlx::query_as(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks \
             WHERE content = $1 AND embedding IS NOT NULL \
             LIMIT 1"
        ))
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Embedding::from))
    }
}

#[async_trait]
impl MetadataStore for PgVectorStore {
    async fn persist_document_chunks(
        &self,
        document_id: Uuid,
        filename: &str,
        document_type: &str,
        file_size: usize,
        chunks: &[Chunk],
        embedding_model: &str,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO documents (
                   id, filename, document_type, total_chunks, file_size, ingestion_status
               ) VALUES ($1, $2, $3, $4, $5, 'processing')
               ON CONFLICT (id) DO UPDATE SET
                   filename = EXCLUDED.filename,
                   document_type = EXCLUDED.document_type,
                   total_chunks = EXCLUDED.total_chunks,
                   file_size = EXCLUDED.file_size,
                   ingestion_status = EXCLUDED.ingestion_status,
                   updated_at = NOW()"#,
        )
        .bind(document_id)
        .bind(filename)
        .bind(document_type)
        .bind(chunks.len() as i32)
        .bind(file_size as i64)
        .execute(&mut *tx)
        .await?;

        for (chunk_index, chunk) in chunks.iter().enumerate() {
            let metadata = &chunk.metadata;
            let source = metadata
                .source_filename
                .clone()
                .unwrap_or_else(|| filename.to_string());

            sqlx::query(
                r#"INSERT INTO chunks (
                       id, document_id, chunk_index, content, original_content,
                       embedding_model, source, document_type, language,
                       page_number, section_title, user_id, quality_score, is_duplicate
                   ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                   ON CONFLICT (id) DO UPDATE SET
                       content = EXCLUDED.content,
                       original_content = EXCLUDED.original_content,
                       embedding_model = EXCLUDED.embedding_model,
                       source = EXCLUDED.source,
                       document_type = EXCLUDED.document_type,
                       language = EXCLUDED.language,
                       page_number = EXCLUDED.page_number,
                       section_title = EXCLUDED.section_title,
                       user_id = EXCLUDED.user_id,
                       quality_score = EXCLUDED.quality_score,
                       is_duplicate = EXCLUDED.is_duplicate,
                       updated_at = NOW()"#,
            )
            .bind(chunk.chunk_id)
            .bind(chunk.document_id)
            .bind(chunk_index as i32)
            .bind(&chunk.content)
            .bind(&chunk.original_content)
            .bind(embedding_model)
            .bind(source)
            .bind(metadata.document_type.map(|f| f.as_str().to_string()))
            .bind(
                metadata
                    .language
                    .clone()
                    .unwrap_or_else(|| "en".to_string()),
            )
            .bind(metadata.page_number as i32)
            .bind(metadata.section_title.clone())
            .bind(
                metadata
                    .user_id
                    .clone()
                    .unwrap_or_else(|| "anonymous".to_string()),
            )
            .bind(chunk.quality_score)
            .bind(chunk.is_duplicate)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(document_id = %document_id, chunks = chunks.len(), "documents_chunks_persisted");
        Ok(())
    }

    async fn mark_ingestion_status(
        &self,
        document_id: Uuid,
        status: &str,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE documents SET ingestion_status = $2, updated_at = NOW() WHERE id = $1")
            .bind(document_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
