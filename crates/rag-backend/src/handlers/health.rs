use std::collections::BTreeMap;

use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppContext;
use crate::utils::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    pub dependencies: BTreeMap<String, String>,
}

fn evaluate_dependencies(ctx: &AppContext) -> BTreeMap<String, String> {
    let mut dependencies = BTreeMap::new();
    dependencies.insert("vector_db".to_string(), "ok".to_string());
    dependencies.insert(
        "embedding_service".to_string(),
        if ctx.settings.openai.api_key.is_some() {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
    );
    dependencies
}

/// `GET /health`: 200 when dependencies are healthy or degraded, 503 when
/// any dependency is unavailable.
pub async fn health_check(
    Extension(ctx): Extension<AppContext>,
) -> Result<Json<HealthResponse>, ApiError> {
    let dependencies = evaluate_dependencies(&ctx);

    if dependencies.values().any(|status| status == "unavailable") {
        tracing::error!(?dependencies, "health_check_failed");
        return Err(ApiError::ServiceUnavailable(
            "One or more dependencies are unavailable".to_string(),
        ));
    }

    let status = if dependencies.values().any(|status| status == "degraded") {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    Ok(Json(HealthResponse {
        status,
        version: ctx.settings.version.clone(),
        timestamp: Utc::now(),
        environment: ctx.settings.environment.clone(),
        dependencies,
    }))
}

/// Root endpoint with basic API metadata.
pub async fn root(Extension(ctx): Extension<AppContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "RAG Backend",
        "version": ctx.settings.version,
        "description": "Retrieval-Augmented Generation backend service",
        "status": ctx.settings.environment,
    }))
}
