use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::chunk::{Chunk, ChunkingStrategy};
use crate::models::document::ExtractedDocument;
use crate::models::embedding::{Embedding, STANDARD_EMBEDDING_MODEL};

/// Ingestion pipeline status. Transitions are monotonic:
/// pending → processing → {completed | failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Pipeline stage an ingestion failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStage {
    Extraction,
    Chunking,
    Embedding,
    Storage,
}

impl ErrorStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStage::Extraction => "extraction",
            ErrorStage::Chunking => "chunking",
            ErrorStage::Embedding => "embedding",
            ErrorStage::Storage => "storage",
        }
    }
}

/// Metadata about one validated uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFileInfo {
    pub filename: String,
    pub file_size_mb: f64,
    pub mime_type: String,
}

/// Caller-supplied document metadata, passed through to storage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_chunk_size_tokens() -> usize {
    500
}

fn default_chunk_overlap_tokens() -> usize {
    50
}

fn default_embedding_model() -> String {
    STANDARD_EMBEDDING_MODEL.to_string()
}

/// Caller-supplied ingestion tuning. Token-based sizes are translated to
/// character-based chunking parameters by the orchestrator.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_chunk_size_tokens")]
    pub chunk_size_tokens: usize,
    #[serde(default = "default_chunk_overlap_tokens")]
    pub chunk_overlap_tokens: usize,
    #[serde(default)]
    pub chunking_strategy: Option<ChunkingStrategy>,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        IngestionConfig {
            chunk_size_tokens: default_chunk_size_tokens(),
            chunk_overlap_tokens: default_chunk_overlap_tokens(),
            chunking_strategy: None,
            embedding_model: default_embedding_model(),
        }
    }
}

/// In-memory representation of an ingestion job.
///
/// Tracks the lifecycle and metrics of a single ingestion run from upload
/// through extraction, chunking, embedding, and storage.
#[derive(Debug, Clone)]
pub struct IngestionJob {
    pub ingestion_id: Uuid,
    pub document_id: Uuid,
    pub status: IngestionStatus,
    pub files: Vec<UploadedFileInfo>,

    pub extracted_document: Option<ExtractedDocument>,
    pub chunks: Vec<Chunk>,
    pub embeddings: Vec<Embedding>,

    /// Per-stage metrics, keyed `{stage}_duration_ms` plus extras.
    pub metrics: HashMap<String, Value>,

    pub error_message: Option<String>,
    pub error_stage: Option<ErrorStage>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

const STAGE_DURATION_KEYS: [&str; 4] = [
    "extraction_duration_ms",
    "chunking_duration_ms",
    "embedding_duration_ms",
    "storage_duration_ms",
];

impl IngestionJob {
    pub fn new(ingestion_id: Uuid, document_id: Uuid, files: Vec<UploadedFileInfo>) -> Self {
        IngestionJob {
            ingestion_id,
            document_id,
            status: IngestionStatus::Pending,
            files,
            extracted_document: None,
            chunks: Vec::new(),
            embeddings: Vec::new(),
            metrics: HashMap::new(),
            error_message: None,
            error_stage: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Progress estimate based on status and which stage metrics exist:
    /// 0 when pending, 25% + 20% per completed stage (capped at 99) while
    /// processing, 100 when completed, at least 50 when failed.
    pub fn progress_percent(&self) -> u8 {
        match self.status {
            IngestionStatus::Pending => 0,
            IngestionStatus::Processing => self.processing_progress(),
            IngestionStatus::Completed => 100,
            IngestionStatus::Failed => self.processing_progress().max(50),
        }
    }

    fn processing_progress(&self) -> u8 {
        let stages_completed = STAGE_DURATION_KEYS
            .iter()
            .filter(|key| self.metrics.contains_key(**key))
            .count() as u8;
        (25 + stages_completed * 20).min(99)
    }

    /// Total elapsed time since job creation in milliseconds.
    pub fn total_duration_ms(&self) -> f64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.created_at).num_milliseconds() as f64
    }

    pub fn chunks_created(&self) -> usize {
        self.chunks.len()
    }
}

/// API-facing view of an ingestion job.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionResponse {
    pub ingestion_id: Uuid,
    pub status: IngestionStatus,
    pub document_id: Uuid,
    pub files: Vec<UploadedFileInfo>,
    pub chunks_created: usize,
    pub progress_percent: u8,
    pub error_message: Option<String>,
    pub error_stage: Option<ErrorStage>,
    pub created_at: DateTime<Utc>,
}

impl From<&IngestionJob> for IngestionResponse {
    fn from(job: &IngestionJob) -> Self {
        IngestionResponse {
            ingestion_id: job.ingestion_id,
            status: job.status,
            document_id: job.document_id,
            files: job.files.clone(),
            chunks_created: job.chunks_created(),
            progress_percent: job.progress_percent(),
            error_message: job.error_message.clone(),
            error_stage: job.error_stage,
            created_at: job.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> IngestionJob {
        IngestionJob::new(Uuid::new_v4(), Uuid::new_v4(), vec![])
    }

    #[test]
    fn pending_job_reports_zero_progress() {
        assert_eq!(job().progress_percent(), 0);
    }

    #[test]
    fn progress_advances_with_stage_metrics() {
        let mut job = job();
        job.status = IngestionStatus::Processing;
        assert_eq!(job.progress_percent(), 25);

        job.metrics
            .insert("extraction_duration_ms".into(), json!(12.0));
        assert_eq!(job.progress_percent(), 45);

        job.metrics
            .insert("chunking_duration_ms".into(), json!(3.0));
        job.metrics
            .insert("embedding_duration_ms".into(), json!(80.0));
        job.metrics.insert("storage_duration_ms".into(), json!(9.0));
        assert_eq!(job.progress_percent(), 99);

        job.status = IngestionStatus::Completed;
        assert_eq!(job.progress_percent(), 100);
    }

    #[test]
    fn failed_job_reports_at_least_fifty() {
        let mut job = job();
        job.status = IngestionStatus::Failed;
        assert_eq!(job.progress_percent(), 50);

        job.metrics
            .insert("extraction_duration_ms".into(), json!(1.0));
        job.metrics
            .insert("chunking_duration_ms".into(), json!(1.0));
        job.metrics
            .insert("embedding_duration_ms".into(), json!(1.0));
        assert_eq!(job.progress_percent(), 85);
    }
}
