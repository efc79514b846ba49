pub mod artifacts;
pub mod chunking;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod guardrails;
pub mod handlers;
pub mod ingestion;
pub mod models;
pub mod query;
pub mod state;
pub mod storage;
pub mod utils;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Extension, Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::state::AppContext;

/// Uploads may carry up to 500 MiB of files plus multipart overhead.
const MAX_BODY_BYTES: usize = 550 * 1024 * 1024;

pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health_check))
        .route("/api/ingest/upload", post(handlers::ingest::upload_handler))
        .route(
            "/api/ingest/status/{ingestion_id}",
            get(handlers::ingest::upload_status_handler),
        )
        .route("/ingest", post(handlers::ingest::ingest_handler))
        .route(
            "/ingest/status/{ingestion_id}",
            get(handlers::ingest::ingest_status_handler),
        )
        .route("/api/query", post(handlers::query::query_handler))
        .route("/retrieve", post(handlers::query::retrieve_handler))
        .route(
            "/api/debug/artifacts",
            get(handlers::debug::debug_artifacts_handler),
        )
        .layer(Extension(ctx))
        .layer(middleware::from_fn(guardrails::trace::trace_middleware))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .layer(CatchPanicLayer::new())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
