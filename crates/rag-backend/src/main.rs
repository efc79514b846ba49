use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use rag_backend::artifacts::{
    ArtifactLogger, ArtifactStore, InMemoryArtifactStore, PgArtifactStore,
};
use rag_backend::build_router;
use rag_backend::config::Settings;
use rag_backend::embedding::{
    BatchEmbeddingProvider, EmbeddingService, OpenAiEmbeddingClient, QueryEmbeddingCache,
};
use rag_backend::extract::TextExtractionService;
use rag_backend::guardrails::RateLimiter;
use rag_backend::ingestion::{IngestionJobStore, IngestionOrchestrator};
use rag_backend::models::embedding::BatchEmbeddingConfig;
use rag_backend::query::llm::OpenAiGenerationClient;
use rag_backend::query::{GenerationOrchestrator, QueryOrchestrator, RetrieverService};
use rag_backend::state::AppContext;
use rag_backend::storage::postgres::connect_pool;
use rag_backend::storage::{InMemoryVectorStore, MetadataStore, PgVectorStore, VectorStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,rag_backend=debug".to_string()),
        )
        .with_target(true)
        .json()
        .init();

    info!("Starting RAG backend...");

    let settings = Arc::new(Settings::load()?);
    info!(environment = %settings.environment, "Configuration loaded");

    // Storage: Postgres/pgvector when DATABASE_URL is set, in-memory
    // reference stores otherwise.
    let (vector_store, metadata_store, artifact_store): (
        Arc<dyn VectorStore>,
        Option<Arc<dyn MetadataStore>>,
        Arc<dyn ArtifactStore>,
    ) = match &settings.database.url {
        Some(url) => {
            let pool = connect_pool(url, settings.database.pool_max_size).await?;
            info!("Database connection established");
            let store = Arc::new(PgVectorStore::new(pool.clone()));
            (
                store.clone(),
                Some(store as Arc<dyn MetadataStore>),
                Arc::new(PgArtifactStore::new(pool)),
            )
        }
        None => {
            info!("No DATABASE_URL configured; using in-memory stores");
            (
                Arc::new(InMemoryVectorStore::new()),
                None,
                Arc::new(InMemoryArtifactStore::new()),
            )
        }
    };

    // Providers.
    let embedding_client = Arc::new(OpenAiEmbeddingClient::new(
        settings.openai.base_url.clone(),
        settings.openai.api_key.clone(),
        settings.openai.embedding_model.clone(),
        60,
    ));
    let embedding_provider = Arc::new(BatchEmbeddingProvider::new(embedding_client));

    let llm_client = Arc::new(OpenAiGenerationClient::new(
        settings.openai.base_url.clone(),
        settings.openai.api_key.clone(),
        settings.openai.generation_model.clone(),
        settings.openai.temperature,
        settings.query.timeout_seconds.max(60),
    ));

    let embed_defaults = BatchEmbeddingConfig {
        batch_size: settings.openai.embedding_batch_size,
        model: settings.openai.embedding_model.clone(),
        max_retries: settings.query.max_retries,
        base_backoff_seconds: settings.query.base_backoff_seconds,
        embedding_dimension: settings.openai.embedding_dimension,
        ..BatchEmbeddingConfig::default()
    };

    // Core services.
    let extraction_service = Arc::new(TextExtractionService::new(settings.pdf.clone()));
    let embedding_service = Arc::new(EmbeddingService::new(
        embedding_provider.clone(),
        vector_store.clone(),
    ));

    let job_store = Arc::new(IngestionJobStore::new());
    let ingestion_orchestrator = Arc::new(IngestionOrchestrator::new(
        extraction_service,
        Some(embedding_service),
        job_store.clone(),
        metadata_store,
        embed_defaults.clone(),
    ));

    let query_orchestrator = Arc::new(QueryOrchestrator::new(
        embedding_provider,
        RetrieverService::new(vector_store),
        QueryEmbeddingCache::new(Duration::from_secs(settings.query.cache_ttl_seconds)),
        embed_defaults,
    ));

    let artifact_logger = Arc::new(ArtifactLogger::new(
        settings.debug.clone(),
        artifact_store.clone(),
    ));
    let generation_orchestrator = Arc::new(GenerationOrchestrator::new(
        query_orchestrator.clone(),
        llm_client,
        artifact_logger,
        settings.openai.generation_model.clone(),
    ));

    // Periodic retention cleanup for debug artifacts.
    if settings.debug.enabled {
        let store = artifact_store.clone();
        let retention_hours = settings.debug.retention_hours;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                match store.cleanup_old_artifacts(retention_hours).await {
                    Ok(deleted) if deleted > 0 => {
                        info!(deleted, "debug_artifacts_cleaned");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "artifact_cleanup_failed"),
                }
            }
        });
    }

    let ctx = AppContext {
        settings: settings.clone(),
        job_store,
        ingestion_orchestrator,
        query_orchestrator,
        generation_orchestrator,
        artifact_store,
        rate_limiter: Arc::new(RateLimiter::new()),
    };

    let app = build_router(ctx);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    info!("Server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
