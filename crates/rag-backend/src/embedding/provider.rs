use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::embedding::{BatchEmbeddingConfig, Embedding, EmbeddingInput};
use crate::utils::error::ApiError;

/// Error from one embedding provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("embedding API error ({status}): {body}")]
    Http { status: u16, body: String },
    #[error("embedding transport error: {0}")]
    Transport(String),
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transport/server-class failures retry; client-class misuse does not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            ProviderError::Transport(_) => true,
            ProviderError::InvalidResponse(_) => true,
        }
    }
}

/// Raised when the provider exhausts retries or fails fatally.
#[derive(Debug, Error)]
#[error("Embedding provider failed after {attempts} attempts: {source}")]
pub struct EmbeddingProviderError {
    pub attempts: u32,
    #[source]
    pub source: ProviderError,
}

impl From<EmbeddingProviderError> for ApiError {
    fn from(err: EmbeddingProviderError) -> Self {
        ApiError::Provider {
            message: err.to_string(),
            error_code: "provider_error".to_string(),
            status_code: 503,
        }
    }
}

/// Low-level embedding client: texts in, one vector per text out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

/// OpenAI-compatible `/v1/embeddings` client.
pub struct OpenAiEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiEmbeddingClient {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        timeout_seconds: u64,
    ) -> Self {
        OpenAiEmbeddingClient {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_seconds))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let request = OpenAiEmbeddingRequest {
            input: texts,
            model: &self.model,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let mut payload: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;

        if payload.data.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                payload.data.len()
            )));
        }

        payload.data.sort_by_key(|item| item.index);
        Ok(payload.data.into_iter().map(|item| item.embedding).collect())
    }
}

/// Retry a fallible async operation with exponential backoff.
///
/// `retryable` gates which errors are retried; the sleep doubles after
/// each attempt starting from `base_backoff`. Returns the final error and
/// the attempt count when exhausted.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    max_retries: u32,
    base_backoff: Duration,
    mut operation: F,
    retryable: P,
) -> Result<T, (u32, E)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempts = 0u32;
    let mut delay = base_backoff;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !retryable(&err) || attempts > max_retries {
                    return Err((attempts, err));
                }
                tracing::warn!(
                    attempt = attempts,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "embedding_batch_retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

/// Batch embedding provider with partitioning, retry, and backoff over a
/// low-level client.
pub struct BatchEmbeddingProvider {
    client: Arc<dyn EmbeddingClient>,
}

impl BatchEmbeddingProvider {
    pub fn new(client: Arc<dyn EmbeddingClient>) -> Self {
        BatchEmbeddingProvider { client }
    }

    async fn embed_with_retries(
        &self,
        texts: &[String],
        config: &BatchEmbeddingConfig,
    ) -> Result<Vec<Vec<f32>>, EmbeddingProviderError> {
        retry_with_backoff(
            config.max_retries,
            Duration::from_secs_f64(config.base_backoff_seconds),
            || self.client.embed_batch(texts),
            ProviderError::is_retryable,
        )
        .await
        .map_err(|(attempts, source)| {
            tracing::error!(
                attempts,
                max_retries = config.max_retries,
                retryable = source.is_retryable(),
                error = %source,
                "embedding_batch_failed"
            );
            EmbeddingProviderError { attempts, source }
        })
    }

    /// Embed texts, partitioned into provider calls of at most
    /// `config.batch_size`. Returns one vector per input text.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        config: &BatchEmbeddingConfig,
    ) -> Result<Vec<Vec<f32>>, EmbeddingProviderError> {
        let mut all_vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(config.batch_size.max(1)) {
            let vectors = self.embed_with_retries(batch, config).await?;
            all_vectors.extend(vectors);
        }
        Ok(all_vectors)
    }

    /// Embed a single query string.
    pub async fn embed_query(
        &self,
        text: &str,
        config: &BatchEmbeddingConfig,
    ) -> Result<Vec<f32>, EmbeddingProviderError> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_with_retries(&texts, config).await?;
        vectors.pop().ok_or(EmbeddingProviderError {
            attempts: 1,
            source: ProviderError::InvalidResponse("provider returned no embedding".into()),
        })
    }

    /// Embed inputs and wrap results as fully-populated `Embedding`
    /// models aligned with the inputs.
    pub async fn embed_with_metadata(
        &self,
        inputs: &[EmbeddingInput],
        config: &BatchEmbeddingConfig,
    ) -> Result<Vec<Embedding>, EmbeddingProviderError> {
        let texts: Vec<String> = inputs.iter().map(|input| input.content.clone()).collect();
        let vectors = self.embed_batch(&texts, config).await?;

        if vectors.len() != inputs.len() {
            return Err(EmbeddingProviderError {
                attempts: 1,
                source: ProviderError::InvalidResponse(
                    "provider returned a different number of embeddings than inputs".into(),
                ),
            });
        }

        let now = Utc::now();
        Ok(inputs
            .iter()
            .zip(vectors)
            .map(|(input, vector)| Embedding {
                embedding_id: Uuid::new_v4(),
                chunk_id: input.chunk_id,
                document_id: input.document_id,
                content: input.content.clone(),
                embedding: vector,
                embedding_model: config.model.clone(),
                embedding_dimension: config.embedding_dimension,
                metadata: input.metadata.clone(),
                quality_score: input.quality_score,
                embedding_quality_score: 0.0,
                created_at: now,
                updated_at: now,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn retryability_classification() {
        assert!(ProviderError::Http {
            status: 429,
            body: String::new()
        }
        .is_retryable());
        assert!(ProviderError::Http {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::Http {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(ProviderError::Transport("reset".into()).is_retryable());
    }

    #[tokio::test]
    async fn retry_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(
            3,
            Duration::from_millis(1),
            || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(ProviderError::Transport("flaky".into()))
                    } else {
                        Ok(42u32)
                    }
                }
            },
            ProviderError::is_retryable,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = retry_with_backoff(
            5,
            Duration::from_millis(1),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ProviderError::Http {
                        status: 400,
                        body: "invalid argument".into(),
                    })
                }
            },
            ProviderError::is_retryable,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_partitions_inputs_into_batches() {
        let mut client = MockEmbeddingClient::new();
        client
            .expect_embed_batch()
            .times(3)
            .returning(|texts| Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect()));

        let provider = BatchEmbeddingProvider::new(Arc::new(client));
        let config = BatchEmbeddingConfig {
            batch_size: 2,
            ..Default::default()
        };
        let texts: Vec<String> = (0..5).map(|i| format!("text {i}")).collect();

        let vectors = provider.embed_batch(&texts, &config).await.unwrap();
        assert_eq!(vectors.len(), 5);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_provider_error() {
        let mut client = MockEmbeddingClient::new();
        client.expect_embed_batch().returning(|_| {
            Err(ProviderError::Http {
                status: 503,
                body: "down".into(),
            })
        });

        let provider = BatchEmbeddingProvider::new(Arc::new(client));
        let config = BatchEmbeddingConfig {
            max_retries: 2,
            base_backoff_seconds: 0.001,
            ..Default::default()
        };

        let err = provider
            .embed_batch(&["a".to_string()], &config)
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 3); // initial try + 2 retries
    }
}
