use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::config::Settings;
use crate::guardrails::RateLimiter;
use crate::ingestion::{IngestionJobStore, IngestionOrchestrator};
use crate::query::{GenerationOrchestrator, QueryOrchestrator};

/// Application services shared across handlers via a single `Extension`.
#[derive(Clone)]
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub job_store: Arc<IngestionJobStore>,
    pub ingestion_orchestrator: Arc<IngestionOrchestrator>,
    pub query_orchestrator: Arc<QueryOrchestrator>,
    pub generation_orchestrator: Arc<GenerationOrchestrator>,
    pub artifact_store: Arc<dyn ArtifactStore>,
    pub rate_limiter: Arc<RateLimiter>,
}
