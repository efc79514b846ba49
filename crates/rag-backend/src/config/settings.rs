use anyhow::{bail, Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

use crate::models::embedding::{STANDARD_EMBEDDING_DIMENSION, STANDARD_EMBEDDING_MODEL};

pub const STANDARD_GENERATION_MODEL: &str = "gpt-5-nano";
pub const GENERATION_CONTEXT_WINDOW: usize = 128_000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub openai: OpenAiConfig,
    pub query: QueryConfig,
    pub debug: DebugConfig,
    pub pdf: PdfPipelineConfig,
    pub environment: String,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub pool_max_size: u32,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub embedding_batch_size: usize,
    pub generation_model: String,
    pub temperature: f32,
    pub context_window: usize,
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub timeout_seconds: u64,
    pub cache_ttl_seconds: u64,
    pub max_retries: u32,
    pub base_backoff_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct DebugConfig {
    pub enabled: bool,
    pub retention_hours: i64,
    pub max_artifact_size_bytes: usize,
    pub artifacts_token: Option<String>,
    pub include_chunk_content: bool,
    pub include_prompt_details: bool,
    pub include_llm_raw_output: bool,
}

#[derive(Debug, Clone)]
pub struct PdfPipelineConfig {
    pub tier1_enabled: bool,
    pub tier2_enabled: bool,
    pub tier3_enabled: bool,
    pub tier4_enabled: bool,
    pub auto_fallback: bool,
    pub extractability_threshold: f32,
    pub tier3_api_key: Option<String>,
    pub tier3_base_url: String,
    pub tier3_timeout_seconds: u64,
    pub tier4_timeout_seconds: u64,
    pub tier4_dpi: u32,
    pub tier4_lang: String,
    pub tesseract_cmd: String,
}

impl Default for PdfPipelineConfig {
    fn default() -> Self {
        PdfPipelineConfig {
            tier1_enabled: true,
            tier2_enabled: false,
            tier3_enabled: false,
            tier4_enabled: false,
            auto_fallback: true,
            extractability_threshold: 0.3,
            tier3_api_key: None,
            tier3_base_url: "https://api.cloud.llamaindex.ai".to_string(),
            tier3_timeout_seconds: 120,
            tier4_timeout_seconds: 120,
            tier4_dpi: 300,
            tier4_lang: "eng".to_string(),
            tesseract_cmd: "tesseract".to_string(),
        }
    }
}

/// Flat view of the environment, deserialized through the `config` crate.
/// Keys are the lowercased environment variable names.
#[derive(Debug, Default, Deserialize)]
struct RawEnv {
    server_host: Option<String>,
    server_port: Option<u16>,
    environment: Option<String>,

    database_url: Option<String>,
    database_pool_max_size: Option<u32>,

    openai_api_key: Option<String>,
    openai_base_url: Option<String>,
    openai_embedding_model: Option<String>,
    openai_embedding_batch_size: Option<usize>,
    openai_generation_model: Option<String>,
    openai_temperature: Option<f32>,

    query_timeout_seconds: Option<u64>,
    query_cache_ttl_seconds: Option<u64>,

    debug_rag: Option<String>,
    debug_retention_hours: Option<i64>,
    debug_max_size: Option<usize>,
    debug_artifacts_token: Option<String>,

    pdf_tier1_enabled: Option<String>,
    pdf_tier2_enabled: Option<String>,
    pdf_tier3_enabled: Option<String>,
    pdf_tier4_enabled: Option<String>,
    pdf_auto_fallback: Option<String>,
    pdf_extractability_threshold: Option<f32>,
    pdf_tier3_timeout_seconds: Option<u64>,
    pdf_tier4_timeout_seconds: Option<u64>,
    pdf_tier4_dpi: Option<u32>,
    pdf_tier4_lang: Option<String>,
    llama_cloud_api_key: Option<String>,
    tesseract_cmd: Option<String>,
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value {
        None => default,
        Some(raw) => matches!(
            raw.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let raw: RawEnv = Config::builder()
            .add_source(Environment::default())
            .build()
            .context("failed to read environment configuration")?
            .try_deserialize()
            .context("failed to deserialize environment configuration")?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEnv) -> Result<Self> {
        let embedding_model = raw
            .openai_embedding_model
            .unwrap_or_else(|| STANDARD_EMBEDDING_MODEL.to_string());
        if embedding_model != STANDARD_EMBEDDING_MODEL {
            bail!(
                "OPENAI_EMBEDDING_MODEL must be '{}', got '{}'; the model is standardized across the system",
                STANDARD_EMBEDDING_MODEL,
                embedding_model
            );
        }

        let embedding_batch_size = raw.openai_embedding_batch_size.unwrap_or(100);
        if !(1..=2048).contains(&embedding_batch_size) {
            bail!(
                "OPENAI_EMBEDDING_BATCH_SIZE must be between 1 and 2048, got {}",
                embedding_batch_size
            );
        }

        let generation_model = raw
            .openai_generation_model
            .unwrap_or_else(|| STANDARD_GENERATION_MODEL.to_string());

        let temperature = raw.openai_temperature.unwrap_or(0.3);
        if !(0.0..=2.0).contains(&temperature) {
            bail!(
                "OPENAI_TEMPERATURE must be between 0.0 and 2.0, got {}",
                temperature
            );
        }

        let openai = OpenAiConfig {
            api_key: raw.openai_api_key,
            base_url: raw
                .openai_base_url
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            embedding_model,
            embedding_dimension: STANDARD_EMBEDDING_DIMENSION,
            embedding_batch_size,
            generation_model,
            temperature,
            context_window: GENERATION_CONTEXT_WINDOW,
        };

        let pdf_defaults = PdfPipelineConfig::default();
        let pdf = PdfPipelineConfig {
            tier1_enabled: parse_bool(raw.pdf_tier1_enabled, pdf_defaults.tier1_enabled),
            tier2_enabled: parse_bool(raw.pdf_tier2_enabled, pdf_defaults.tier2_enabled),
            tier3_enabled: parse_bool(raw.pdf_tier3_enabled, pdf_defaults.tier3_enabled),
            tier4_enabled: parse_bool(raw.pdf_tier4_enabled, pdf_defaults.tier4_enabled),
            auto_fallback: parse_bool(raw.pdf_auto_fallback, pdf_defaults.auto_fallback),
            extractability_threshold: raw
                .pdf_extractability_threshold
                .unwrap_or(pdf_defaults.extractability_threshold),
            tier3_api_key: raw.llama_cloud_api_key,
            tier3_base_url: pdf_defaults.tier3_base_url,
            tier3_timeout_seconds: raw
                .pdf_tier3_timeout_seconds
                .unwrap_or(pdf_defaults.tier3_timeout_seconds),
            tier4_timeout_seconds: raw
                .pdf_tier4_timeout_seconds
                .unwrap_or(pdf_defaults.tier4_timeout_seconds),
            tier4_dpi: raw.pdf_tier4_dpi.unwrap_or(pdf_defaults.tier4_dpi),
            tier4_lang: raw.pdf_tier4_lang.unwrap_or(pdf_defaults.tier4_lang),
            tesseract_cmd: raw.tesseract_cmd.unwrap_or(pdf_defaults.tesseract_cmd),
        };

        Ok(Settings {
            server: ServerConfig {
                host: raw.server_host.unwrap_or_else(|| "0.0.0.0".to_string()),
                port: raw.server_port.unwrap_or(8000),
            },
            database: DatabaseConfig {
                url: raw.database_url,
                pool_max_size: raw.database_pool_max_size.unwrap_or(10),
            },
            openai,
            query: QueryConfig {
                timeout_seconds: raw.query_timeout_seconds.unwrap_or(30),
                cache_ttl_seconds: raw.query_cache_ttl_seconds.unwrap_or(86_400),
                max_retries: 3,
                base_backoff_seconds: 1.0,
            },
            debug: DebugConfig {
                enabled: parse_bool(raw.debug_rag, false),
                retention_hours: raw.debug_retention_hours.unwrap_or(24),
                max_artifact_size_bytes: raw.debug_max_size.unwrap_or(100_000),
                artifacts_token: raw.debug_artifacts_token,
                include_chunk_content: true,
                include_prompt_details: true,
                include_llm_raw_output: true,
            },
            pdf,
            environment: raw
                .environment
                .unwrap_or_else(|| "development".to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::from_raw(RawEnv::default()).unwrap();
        assert_eq!(settings.openai.embedding_model, STANDARD_EMBEDDING_MODEL);
        assert_eq!(settings.openai.embedding_dimension, 1536);
        assert_eq!(settings.openai.embedding_batch_size, 100);
        assert_eq!(settings.query.timeout_seconds, 30);
        assert!(!settings.debug.enabled);
        assert!(settings.pdf.tier1_enabled);
        assert!(!settings.pdf.tier4_enabled);
    }

    #[test]
    fn rejects_non_standard_embedding_model() {
        let raw = RawEnv {
            openai_embedding_model: Some("text-embedding-ada-002".into()),
            ..Default::default()
        };
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn rejects_out_of_range_batch_size() {
        let raw = RawEnv {
            openai_embedding_batch_size: Some(4096),
            ..Default::default()
        };
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let raw = RawEnv {
            openai_temperature: Some(3.5),
            ..Default::default()
        };
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn parses_debug_and_pdf_toggles() {
        let raw = RawEnv {
            debug_rag: Some("true".into()),
            pdf_tier4_enabled: Some("yes".into()),
            pdf_auto_fallback: Some("off".into()),
            ..Default::default()
        };
        let settings = Settings::from_raw(raw).unwrap();
        assert!(settings.debug.enabled);
        assert!(settings.pdf.tier4_enabled);
        assert!(!settings.pdf.auto_fallback);
    }
}
