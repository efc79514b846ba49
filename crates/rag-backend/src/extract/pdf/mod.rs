pub mod analysis;
pub mod tier1;
pub mod tier2;
pub mod tier3;
pub mod tier4;

use std::time::Instant;

use bytes::Bytes;
use serde_json::json;
use uuid::Uuid;

use crate::config::PdfPipelineConfig;
use crate::extract::ExtractionError;
use crate::models::document::ExtractedDocument;

pub use analysis::PdfAnalysis;

/// Result of one pipeline run, with tier routing metadata.
#[derive(Debug)]
pub struct PipelineResult {
    pub document: ExtractedDocument,
    pub tier_used: u8,
    pub tier_name: &'static str,
    pub fallback_attempted: bool,
    pub fallback_reason: Option<String>,
    pub analysis: PdfAnalysis,
    pub pipeline_duration_ms: f64,
}

fn tier_name(tier: u8) -> &'static str {
    match tier {
        1 => "native",
        2 => "layout",
        3 => "remote_ai",
        _ => "ocr",
    }
}

/// Tier-based PDF extraction with analysis-driven routing and fallback.
///
/// Tiers: 1 fast native text, 2 layout-aware, 3 external AI parse
/// service, 4 rasterize + OCR.
pub struct PdfExtractionPipeline {
    config: PdfPipelineConfig,
}

impl PdfExtractionPipeline {
    pub fn new(config: PdfPipelineConfig) -> Self {
        PdfExtractionPipeline { config }
    }

    fn tier_enabled(&self, tier: u8) -> bool {
        match tier {
            1 => self.config.tier1_enabled,
            2 => self.config.tier2_enabled,
            3 => self.config.tier3_enabled && self.config.tier3_api_key.is_some(),
            4 => self.config.tier4_enabled,
            _ => false,
        }
    }

    /// Use the recommended tier when enabled, otherwise the best enabled
    /// tier (tier 1 as the last resort even when nominally disabled).
    fn select_tier(&self, analysis: &PdfAnalysis, filename: &str) -> u8 {
        let recommended = analysis.recommended_tier;
        let tier = if self.tier_enabled(recommended) {
            recommended
        } else {
            (1..=4u8)
                .find(|tier| self.tier_enabled(*tier))
                .unwrap_or(1)
        };

        tracing::info!(
            filename,
            recommended_tier = recommended,
            selected_tier = tier,
            extractability_ratio = analysis.extractability_ratio,
            has_tables = analysis.has_tables,
            is_scanned = analysis.is_scanned,
            "pdf_pipeline_tier_selected"
        );

        tier
    }

    fn fallback_order(&self, failed_tier: u8) -> Vec<u8> {
        (1..=4u8)
            .filter(|tier| *tier != failed_tier && self.tier_enabled(*tier))
            .collect()
    }

    async fn extract_tier(
        &self,
        tier: u8,
        content: &Bytes,
        document_id: Uuid,
        filename: &str,
        language: Option<&str>,
        password: Option<&str>,
    ) -> Result<ExtractedDocument, ExtractionError> {
        match tier {
            1 => tier1::extract_document(content, document_id, filename, language, password),
            2 => tier2::extract_document(content, document_id, filename, language, password),
            3 => {
                let api_key = self.config.tier3_api_key.clone().ok_or_else(|| {
                    ExtractionError::new(
                        filename,
                        "remote_parse_failed",
                        "Tier 3 requested without an API key",
                    )
                })?;
                let extractor = tier3::RemoteParseExtractor::new(
                    self.config.tier3_base_url.clone(),
                    api_key,
                    self.config.tier3_timeout_seconds,
                );
                extractor
                    .extract_document(content, document_id, filename, language)
                    .await
            }
            4 => {
                let extractor = tier4::OcrExtractor::new(
                    self.config.tesseract_cmd.clone(),
                    self.config.tier4_dpi,
                    self.config.tier4_lang.clone(),
                    self.config.tier4_timeout_seconds,
                );
                extractor
                    .extract_document(content, document_id, filename, language)
                    .await
            }
            other => Err(ExtractionError::new(
                filename,
                "invalid_tier",
                format!("Invalid extraction tier: {other}"),
            )),
        }
    }

    pub async fn extract(
        &self,
        content: &Bytes,
        document_id: Uuid,
        filename: &str,
        language: Option<&str>,
        password: Option<&str>,
    ) -> Result<PipelineResult, ExtractionError> {
        let start = Instant::now();

        let analysis =
            analysis::analyze(content, filename, self.config.extractability_threshold)?;
        let target_tier = self.select_tier(&analysis, filename);

        let mut fallback_attempted = false;
        let mut fallback_reason: Option<String> = None;

        let outcome = match self
            .extract_tier(target_tier, content, document_id, filename, language, password)
            .await
        {
            Ok(document) => Ok((document, target_tier)),
            Err(err) => {
                if !self.config.auto_fallback {
                    return Err(err);
                }

                fallback_attempted = true;
                fallback_reason = Some(err.message.chars().take(100).collect());
                tracing::warn!(
                    filename,
                    failed_tier = target_tier,
                    error = %err,
                    "pdf_pipeline_tier_failed"
                );

                let mut recovered = None;
                let fallback_tiers = self.fallback_order(target_tier);
                for tier in &fallback_tiers {
                    match self
                        .extract_tier(*tier, content, document_id, filename, language, password)
                        .await
                    {
                        Ok(document) => {
                            recovered = Some((document, *tier));
                            break;
                        }
                        Err(_) => continue,
                    }
                }

                recovered.ok_or_else(|| {
                    let mut attempted = vec![target_tier];
                    attempted.extend(&fallback_tiers);
                    ExtractionError::new(
                        filename,
                        "all_tiers_failed",
                        format!("All extraction tiers failed for {filename}"),
                    )
                    .with_details(json!({
                        "attempted_tiers": attempted,
                        "original_error": fallback_reason.clone(),
                    }))
                })
            }
        };

        let (mut document, tier_used) = outcome?;
        let pipeline_duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        let name = tier_name(tier_used);

        document
            .extraction_metadata
            .insert("tier_used".into(), json!(tier_used));
        document
            .extraction_metadata
            .insert("tier_name".into(), json!(name));
        if fallback_attempted {
            document
                .extraction_metadata
                .insert("fallback_reason".into(), json!(fallback_reason.clone()));
        }

        tracing::info!(
            filename,
            document_id = %document_id,
            tier_used,
            tier_name = name,
            fallback_attempted,
            pipeline_duration_ms,
            "pdf_pipeline_completed"
        );

        Ok(PipelineResult {
            document,
            tier_used,
            tier_name: name,
            fallback_attempted,
            fallback_reason,
            analysis,
            pipeline_duration_ms,
        })
    }
}
