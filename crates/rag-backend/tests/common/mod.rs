#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::util::ServiceExt;

use rag_backend::artifacts::{ArtifactLogger, InMemoryArtifactStore};
use rag_backend::build_router;
use rag_backend::config::{
    DatabaseConfig, DebugConfig, OpenAiConfig, PdfPipelineConfig, QueryConfig, ServerConfig,
    Settings,
};
use rag_backend::embedding::{
    BatchEmbeddingProvider, EmbeddingClient, EmbeddingService, ProviderError, QueryEmbeddingCache,
};
use rag_backend::extract::TextExtractionService;
use rag_backend::guardrails::RateLimiter;
use rag_backend::ingestion::{IngestionJobStore, IngestionOrchestrator};
use rag_backend::models::embedding::BatchEmbeddingConfig;
use rag_backend::query::llm::{GenerationOutcome, LlmClient, LlmError, TokenUsage};
use rag_backend::query::{GenerationOrchestrator, QueryOrchestrator, RetrieverService};
use rag_backend::state::AppContext;
use rag_backend::storage::InMemoryVectorStore;

pub const TEST_EMBEDDING_DIMENSION: usize = 8;

/// Deterministic embedding stub: the vector depends only on the input
/// text, with strictly positive components so cosine similarity between
/// any two texts stays positive.
pub struct StubEmbeddingClient;

fn stub_vector(text: &str) -> Vec<f32> {
    let seed: u32 = text.bytes().map(u32::from).sum();
    (0..TEST_EMBEDDING_DIMENSION)
        .map(|i| ((seed + i as u32 * 31) % 97) as f32 / 97.0 + 0.05)
        .collect()
}

#[async_trait]
impl EmbeddingClient for StubEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| stub_vector(text)).collect())
    }
}

/// LLM stub answering with a fixed citation marker.
pub struct StubLlmClient {
    pub answer: String,
}

impl StubLlmClient {
    pub fn new(answer: &str) -> Self {
        StubLlmClient {
            answer: answer.to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for StubLlmClient {
    async fn generate(
        &self,
        _system_message: &str,
        _user_message: &str,
        _max_tokens: u32,
    ) -> Result<GenerationOutcome, LlmError> {
        Ok(GenerationOutcome {
            content: self.answer.clone(),
            model: "gpt-5-nano".to_string(),
            usage: TokenUsage {
                prompt_tokens: 120,
                completion_tokens: 25,
                total_tokens: 145,
            },
            finish_reason: Some("stop".to_string()),
            latency_ms: 3.0,
        })
    }
}

pub fn test_settings(debug_enabled: bool) -> Settings {
    Settings {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: None,
            pool_max_size: 5,
        },
        openai: OpenAiConfig {
            api_key: Some("sk-test".to_string()),
            base_url: "http://localhost".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: TEST_EMBEDDING_DIMENSION,
            embedding_batch_size: 16,
            generation_model: "gpt-5-nano".to_string(),
            temperature: 0.3,
            context_window: 128_000,
        },
        query: QueryConfig {
            timeout_seconds: 30,
            cache_ttl_seconds: 86_400,
            max_retries: 1,
            base_backoff_seconds: 0.001,
        },
        debug: DebugConfig {
            enabled: debug_enabled,
            retention_hours: 24,
            max_artifact_size_bytes: 100_000,
            artifacts_token: None,
            include_chunk_content: true,
            include_prompt_details: true,
            include_llm_raw_output: true,
        },
        pdf: PdfPipelineConfig::default(),
        environment: "test".to_string(),
        version: "0.1.0".to_string(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub artifact_store: Arc<InMemoryArtifactStore>,
}

pub fn build_test_app(settings: Settings) -> TestApp {
    let settings = Arc::new(settings);

    let vector_store = Arc::new(InMemoryVectorStore::new());
    let artifact_store = Arc::new(InMemoryArtifactStore::new());

    let embed_defaults = BatchEmbeddingConfig {
        batch_size: settings.openai.embedding_batch_size,
        model: settings.openai.embedding_model.clone(),
        max_retries: settings.query.max_retries,
        base_backoff_seconds: settings.query.base_backoff_seconds,
        embedding_dimension: settings.openai.embedding_dimension,
        ..BatchEmbeddingConfig::default()
    };

    let embedding_provider = Arc::new(BatchEmbeddingProvider::new(Arc::new(StubEmbeddingClient)));
    let embedding_service = Arc::new(EmbeddingService::new(
        embedding_provider.clone(),
        vector_store.clone(),
    ));

    let job_store = Arc::new(IngestionJobStore::new());
    let ingestion_orchestrator = Arc::new(IngestionOrchestrator::new(
        Arc::new(TextExtractionService::new(settings.pdf.clone())),
        Some(embedding_service),
        job_store.clone(),
        None,
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
        Arc::new(StubLlmClient::new(
            "Based on the provided context, hello [Source 1].",
        )),
        artifact_logger,
        settings.openai.generation_model.clone(),
    ));

    let ctx = AppContext {
        settings,
        job_store,
        ingestion_orchestrator,
        query_orchestrator,
        generation_orchestrator,
        artifact_store: artifact_store.clone(),
        rate_limiter: Arc::new(RateLimiter::new()),
    };

    TestApp {
        router: build_router(ctx),
        artifact_store,
    }
}

pub const BOUNDARY: &str = "test-boundary-7f9a2";

/// Build a multipart body with one file field per entry.
pub fn multipart_body(files: &[(&str, &str, &[u8])]) -> (String, Vec<u8>) {
    let mut body: Vec<u8> = Vec::new();
    for (filename, content_type, content) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    (
        format!("multipart/form-data; boundary={BOUNDARY}"),
        body,
    )
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn json_request(uri: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

pub async fn ingest_text_file(router: &Router, filename: &str, content: &[u8]) -> Value {
    let (content_type, body) = multipart_body(&[(filename, "text/plain", content)]);
    let request = Request::builder()
        .method("POST")
        .uri("/ingest")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();

    let response = send(router, request).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    json_body(response).await
}
