use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::chunk::Chunk;
use crate::models::document::ExtractedDocument;
use crate::models::embedding::Embedding;
use crate::models::ingestion::{IngestionJob, IngestionStatus, UploadedFileInfo};

const STAGE_DURATION_KEYS: [&str; 4] = [
    "extraction_duration_ms",
    "chunking_duration_ms",
    "embedding_duration_ms",
    "storage_duration_ms",
];

/// In-memory store for ingestion jobs.
///
/// Jobs are created by upload handlers and mutated exclusively by the
/// ingestion orchestrator; the status endpoints read snapshots.
#[derive(Default)]
pub struct IngestionJobStore {
    jobs: RwLock<HashMap<Uuid, IngestionJob>>,
}

impl IngestionJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_job(
        &self,
        ingestion_id: Uuid,
        document_id: Uuid,
        files: Vec<UploadedFileInfo>,
    ) -> IngestionJob {
        let job = IngestionJob::new(ingestion_id, document_id, files);
        self.jobs.write().insert(ingestion_id, job.clone());
        job
    }

    pub fn get_job(&self, ingestion_id: Uuid) -> Option<IngestionJob> {
        self.jobs.read().get(&ingestion_id).cloned()
    }

    /// Update status and optional error fields. Status transitions are
    /// monotonic: `started_at` is stamped on the first move to
    /// processing, `completed_at` on reaching a terminal state.
    pub fn update_status(
        &self,
        ingestion_id: Uuid,
        status: IngestionStatus,
        error_message: Option<String>,
        error_stage: Option<crate::models::ingestion::ErrorStage>,
    ) {
        let mut jobs = self.jobs.write();
        let Some(job) = jobs.get_mut(&ingestion_id) else {
            return;
        };

        job.status = status;
        if error_message.is_some() {
            job.error_message = error_message;
        }
        if error_stage.is_some() {
            job.error_stage = error_stage;
        }

        if status == IngestionStatus::Processing && job.started_at.is_none() {
            job.started_at = Some(Utc::now());
        }
        if matches!(
            status,
            IngestionStatus::Completed | IngestionStatus::Failed
        ) {
            job.completed_at = Some(Utc::now());
        }
    }

    /// Record `{stage}_duration_ms` plus any extra metric values, and
    /// refresh the derived total across stages.
    pub fn update_metrics(
        &self,
        ingestion_id: Uuid,
        stage: &str,
        duration_ms: f64,
        extra_metrics: Vec<(String, Value)>,
    ) {
        let mut jobs = self.jobs.write();
        let Some(job) = jobs.get_mut(&ingestion_id) else {
            return;
        };

        job.metrics
            .insert(format!("{stage}_duration_ms"), json!(duration_ms));
        for (key, value) in extra_metrics {
            job.metrics.insert(key, value);
        }

        let total: f64 = STAGE_DURATION_KEYS
            .iter()
            .filter_map(|key| job.metrics.get(*key))
            .filter_map(Value::as_f64)
            .sum();
        job.metrics.insert("total_duration_ms".into(), json!(total));
    }

    pub fn attach_extracted_document(&self, ingestion_id: Uuid, document: ExtractedDocument) {
        if let Some(job) = self.jobs.write().get_mut(&ingestion_id) {
            job.extracted_document = Some(document);
        }
    }

    pub fn attach_chunks(&self, ingestion_id: Uuid, chunks: Vec<Chunk>) {
        if let Some(job) = self.jobs.write().get_mut(&ingestion_id) {
            job.chunks = chunks;
        }
    }

    pub fn attach_embeddings(&self, ingestion_id: Uuid, embeddings: Vec<Embedding>) {
        if let Some(job) = self.jobs.write().get_mut(&ingestion_id) {
            job.embeddings = embeddings;
        }
    }

    pub fn with_chunks_mut<R>(
        &self,
        ingestion_id: Uuid,
        f: impl FnOnce(&mut Vec<Chunk>) -> R,
    ) -> Option<R> {
        self.jobs
            .write()
            .get_mut(&ingestion_id)
            .map(|job| f(&mut job.chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ingestion::ErrorStage;

    #[test]
    fn create_and_fetch() {
        let store = IngestionJobStore::new();
        let id = Uuid::new_v4();
        store.create_job(id, Uuid::new_v4(), vec![]);

        let job = store.get_job(id).unwrap();
        assert_eq!(job.status, IngestionStatus::Pending);
        assert!(store.get_job(Uuid::new_v4()).is_none());
    }

    #[test]
    fn status_transitions_stamp_timestamps() {
        let store = IngestionJobStore::new();
        let id = Uuid::new_v4();
        store.create_job(id, Uuid::new_v4(), vec![]);

        store.update_status(id, IngestionStatus::Processing, None, None);
        let job = store.get_job(id).unwrap();
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_none());

        store.update_status(id, IngestionStatus::Completed, None, None);
        let job = store.get_job(id).unwrap();
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn failure_records_message_and_stage() {
        let store = IngestionJobStore::new();
        let id = Uuid::new_v4();
        store.create_job(id, Uuid::new_v4(), vec![]);

        store.update_status(
            id,
            IngestionStatus::Failed,
            Some("boom".into()),
            Some(ErrorStage::Chunking),
        );
        let job = store.get_job(id).unwrap();
        assert_eq!(job.error_message.as_deref(), Some("boom"));
        assert_eq!(job.error_stage, Some(ErrorStage::Chunking));
        assert!(job.progress_percent() >= 50);
    }

    #[test]
    fn metrics_accumulate_with_derived_total() {
        let store = IngestionJobStore::new();
        let id = Uuid::new_v4();
        store.create_job(id, Uuid::new_v4(), vec![]);

        store.update_metrics(id, "extraction", 10.0, vec![("pages".into(), json!(3))]);
        store.update_metrics(id, "chunking", 5.0, vec![]);

        let job = store.get_job(id).unwrap();
        assert_eq!(job.metrics["extraction_duration_ms"], json!(10.0));
        assert_eq!(job.metrics["pages"], json!(3));
        assert_eq!(job.metrics["total_duration_ms"], json!(15.0));
    }
}
