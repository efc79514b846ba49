use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::error::ApiError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// One completed LLM generation.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
    pub latency_ms: f64,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("generation provider rate limited: {0}")]
    RateLimited(String),
    #[error("generation provider unavailable: {0}")]
    Unavailable(String),
    #[error("invalid generation request: {0}")]
    InvalidRequest(String),
    #[error("generation API error ({status}): {body}")]
    Http { status: u16, body: String },
    #[error("generation transport error: {0}")]
    Transport(String),
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited(_) => ApiError::Provider {
                message: "The answer generation service is temporarily unavailable due to rate \
                          limiting. Please try again in a little while."
                    .to_string(),
                error_code: "rate_limit".to_string(),
                status_code: 503,
            },
            LlmError::Unavailable(_) => ApiError::Provider {
                message: "The answer generation service is temporarily unavailable. Please try \
                          again later."
                    .to_string(),
                error_code: "service_unavailable".to_string(),
                status_code: 503,
            },
            LlmError::InvalidRequest(_) => ApiError::Provider {
                message: "Your request could not be processed. Please check the query and try \
                          again."
                    .to_string(),
                error_code: "invalid_request".to_string(),
                status_code: 400,
            },
            LlmError::Http { .. } | LlmError::Transport(_) => ApiError::Provider {
                message: "The answer generation provider is temporarily unavailable. Please try \
                          again later."
                    .to_string(),
                error_code: "provider_error".to_string(),
                status_code: 503,
            },
        }
    }
}

/// Completion provider: a black-box chat request/response interface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(
        &self,
        system_message: &str,
        user_message: &str,
        max_tokens: u32,
    ) -> Result<GenerationOutcome, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
    usage: Option<TokenUsage>,
}

/// OpenAI-compatible `/v1/chat/completions` client.
pub struct OpenAiGenerationClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiGenerationClient {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        temperature: f32,
        timeout_seconds: u64,
    ) -> Self {
        OpenAiGenerationClient {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_seconds))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url,
            api_key,
            model,
            temperature,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiGenerationClient {
    async fn generate(
        &self,
        system_message: &str,
        user_message: &str,
        max_tokens: u32,
    ) -> Result<GenerationOutcome, LlmError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_message,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            max_tokens,
            temperature: self.temperature,
            stream: false,
        };

        let start = Instant::now();

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => LlmError::RateLimited(body),
                400 => LlmError::InvalidRequest(body),
                502 | 503 | 504 => LlmError::Unavailable(body),
                code => LlmError::Http { status: code, body },
            });
        }

        let payload: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let choice = payload
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Transport("empty choices in completion".to_string()))?;

        Ok(GenerationOutcome {
            content: choice.message.content.unwrap_or_default(),
            model: payload.model.unwrap_or_else(|| self.model.clone()),
            usage: payload.usage.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_maps_to_503_rate_limit() {
        let api: ApiError = LlmError::RateLimited("slow down".into()).into();
        assert_eq!(api.error_type(), "rate_limit");
        assert_eq!(api.status_code().as_u16(), 503);
    }

    #[test]
    fn invalid_request_maps_to_400() {
        let api: ApiError = LlmError::InvalidRequest("bad".into()).into();
        assert_eq!(api.error_type(), "invalid_request");
        assert_eq!(api.status_code().as_u16(), 400);
    }

    #[test]
    fn unknown_errors_map_to_provider_error() {
        let api: ApiError = LlmError::Transport("conn reset".into()).into();
        assert_eq!(api.error_type(), "provider_error");
        assert_eq!(api.status_code().as_u16(), 503);
    }
}
