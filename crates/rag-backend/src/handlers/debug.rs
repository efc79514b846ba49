use axum::{
    extract::Query,
    http::HeaderMap,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppContext;
use crate::utils::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct DebugArtifactsParams {
    pub trace_id: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned)
}

/// Authorization rules for the debug fetch:
/// - outside `prod`, the endpoint exists only when debug mode is on;
/// - in `prod`, it exists only when a bearer token is configured, and
///   requests must present the matching token.
fn authorize(ctx: &AppContext, headers: &HeaderMap) -> Result<(), ApiError> {
    let is_prod = ctx.settings.environment == "prod";

    if !is_prod {
        if ctx.settings.debug.enabled {
            return Ok(());
        }
        return Err(ApiError::NotFound("Debug artifacts are disabled".to_string()));
    }

    let Some(expected) = &ctx.settings.debug.artifacts_token else {
        return Err(ApiError::NotFound("Debug artifacts are disabled".to_string()));
    };

    match bearer_token(headers) {
        None => Err(ApiError::Unauthorized(
            "Missing bearer token for debug artifacts".to_string(),
        )),
        Some(token) if &token == expected => Ok(()),
        Some(_) => Err(ApiError::Forbidden("Invalid debug artifacts token".to_string())),
    }
}

/// `GET /api/debug/artifacts?trace_id=...`.
pub async fn debug_artifacts_handler(
    Extension(ctx): Extension<AppContext>,
    headers: HeaderMap,
    Query(params): Query<DebugArtifactsParams>,
) -> Result<Json<Value>, ApiError> {
    authorize(&ctx, &headers)?;

    let artifacts = ctx.artifact_store.get_by_trace_id(&params.trace_id).await?;

    Ok(Json(json!({
        "trace_id": params.trace_id,
        "artifacts": artifacts,
    })))
}
