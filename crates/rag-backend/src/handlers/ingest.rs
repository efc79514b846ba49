use axum::{
    extract::{Multipart, Path},
    http::StatusCode,
    Extension, Json,
};
use bytes::Bytes;
use uuid::Uuid;

use crate::guardrails::trace::TraceContext;
use crate::guardrails::RateLimitDecision;
use crate::ingestion::FileValidator;
use crate::models::ingestion::{
    DocumentMetadata, IngestionConfig, IngestionResponse, UploadedFileInfo,
};
use crate::state::AppContext;
use crate::utils::error::{ApiError, FileValidationIssue};

const UPLOADS_PER_HOUR: usize = 100;
const UPLOAD_WINDOW_SECONDS: i64 = 3600;

struct UploadPayload {
    files: Vec<(String, Bytes)>,
    document_metadata: DocumentMetadata,
    ingestion_config: IngestionConfig,
}

async fn read_multipart(mut multipart: Multipart) -> Result<UploadPayload, ApiError> {
    let mut files: Vec<(String, Bytes)> = Vec::new();
    let mut document_metadata = DocumentMetadata::default();
    let mut ingestion_config = IngestionConfig::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("Failed to read field: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "file" => {
                let filename = field.file_name().unwrap_or("upload.bin").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::BadRequest(format!("Failed to read file: {err}")))?;
                files.push((filename, data));
            }
            "document_metadata" => {
                let raw = field.text().await.map_err(|err| {
                    ApiError::BadRequest(format!("Invalid document_metadata: {err}"))
                })?;
                document_metadata =
                    serde_json::from_str(&raw).map_err(|_| ApiError::FileValidation {
                        message: "Invalid document_metadata JSON".to_string(),
                        errors: vec![FileValidationIssue {
                            filename: "document_metadata".to_string(),
                            error: "Must be valid JSON or schema".to_string(),
                        }],
                    })?;
            }
            "ingestion_config" => {
                let raw = field.text().await.map_err(|err| {
                    ApiError::BadRequest(format!("Invalid ingestion_config: {err}"))
                })?;
                ingestion_config =
                    serde_json::from_str(&raw).map_err(|_| ApiError::FileValidation {
                        message: "Invalid ingestion_config JSON".to_string(),
                        errors: vec![FileValidationIssue {
                            filename: "ingestion_config".to_string(),
                            error: "Must be valid JSON or schema".to_string(),
                        }],
                    })?;
            }
            _ => {}
        }
    }

    Ok(UploadPayload {
        files,
        document_metadata,
        ingestion_config,
    })
}

fn enforce_upload_rate_limit(ctx: &AppContext) -> Result<(), ApiError> {
    let user_id = TraceContext::current_user_id().unwrap_or_else(|| "anonymous".to_string());

    match ctx
        .rate_limiter
        .is_allowed(&user_id, UPLOADS_PER_HOUR, UPLOAD_WINDOW_SECONDS)
    {
        RateLimitDecision::Allowed => Ok(()),
        RateLimitDecision::Limited {
            retry_after_seconds,
        } => Err(ApiError::RateLimit {
            message: format!("Maximum {UPLOADS_PER_HOUR} uploads per hour exceeded"),
            retry_after_seconds,
        }),
    }
}

/// Validate the payload and register a pending job, returning its initial
/// record plus the raw files for optional orchestration.
fn register_job(
    ctx: &AppContext,
    payload: &UploadPayload,
) -> Result<(Uuid, Uuid, Vec<UploadedFileInfo>), ApiError> {
    if payload.files.is_empty() {
        return Err(ApiError::FileValidation {
            message: "No files provided".to_string(),
            errors: Vec::new(),
        });
    }

    let (results, batch_error) = FileValidator::validate_batch(&payload.files);
    if let Some(message) = batch_error {
        let errors = results
            .iter()
            .filter(|result| !result.is_valid)
            .map(|result| FileValidationIssue {
                filename: result.filename.clone(),
                error: result
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
            })
            .collect();
        return Err(ApiError::FileValidation { message, errors });
    }

    let ingestion_id = Uuid::new_v4();
    let document_id = Uuid::new_v4();

    let uploaded_files: Vec<UploadedFileInfo> = results
        .iter()
        .map(|result| UploadedFileInfo {
            filename: result.filename.clone(),
            file_size_mb: result.file_size_mb(),
            mime_type: result.mime_type.clone(),
        })
        .collect();

    ctx.job_store
        .create_job(ingestion_id, document_id, uploaded_files.clone());

    Ok((ingestion_id, document_id, uploaded_files))
}

/// `POST /api/ingest/upload`: accept files and register a pending job.
pub async fn upload_handler(
    Extension(ctx): Extension<AppContext>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<IngestionResponse>), ApiError> {
    enforce_upload_rate_limit(&ctx)?;

    let payload = read_multipart(multipart).await?;
    let (ingestion_id, _document_id, uploaded_files) = register_job(&ctx, &payload)?;

    tracing::info!(
        ingestion_id = %ingestion_id,
        file_count = uploaded_files.len(),
        "ingestion_upload_accepted"
    );

    let job = ctx
        .job_store
        .get_job(ingestion_id)
        .ok_or_else(|| ApiError::Internal("Job vanished after creation".to_string()))?;

    Ok((StatusCode::ACCEPTED, Json(IngestionResponse::from(&job))))
}

/// `GET /api/ingest/status/{ingestion_id}`.
pub async fn upload_status_handler(
    Extension(ctx): Extension<AppContext>,
    Path(ingestion_id): Path<Uuid>,
) -> Result<Json<IngestionResponse>, ApiError> {
    let job = ctx
        .job_store
        .get_job(ingestion_id)
        .ok_or_else(|| ApiError::NotFound("Ingestion not found".to_string()))?;
    Ok(Json(IngestionResponse::from(&job)))
}

/// `POST /ingest`: same request shape as `/api/ingest/upload`, but runs
/// the ingestion orchestration synchronously; the response reflects the
/// terminal job state.
pub async fn ingest_handler(
    Extension(ctx): Extension<AppContext>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<IngestionResponse>), ApiError> {
    enforce_upload_rate_limit(&ctx)?;

    let payload = read_multipart(multipart).await?;
    let (ingestion_id, _, _) = register_job(&ctx, &payload)?;

    let job = ctx
        .ingestion_orchestrator
        .ingest_and_store(
            ingestion_id,
            payload.files,
            payload.document_metadata,
            payload.ingestion_config,
        )
        .await?;

    tracing::info!(
        ingestion_id = %ingestion_id,
        status = ?job.status,
        chunks_created = job.chunks_created(),
        "ingestion_orchestrated"
    );

    Ok((StatusCode::ACCEPTED, Json(IngestionResponse::from(&job))))
}

/// `GET /ingest/status/{ingestion_id}`.
pub async fn ingest_status_handler(
    Extension(ctx): Extension<AppContext>,
    Path(ingestion_id): Path<Uuid>,
) -> Result<Json<IngestionResponse>, ApiError> {
    upload_status_handler(Extension(ctx), Path(ingestion_id)).await
}
