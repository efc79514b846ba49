use std::collections::BTreeMap;
use std::time::Instant;

use thiserror::Error;

use crate::config::settings::GENERATION_CONTEXT_WINDOW;
use crate::models::prompt::{CitationSource, PromptRequest, PromptResponse, TokenMetrics};
use crate::models::query::RetrievedChunk;
use crate::utils::error::ApiError;

/// Approximate token counter over whitespace-separated words. Guarantees
/// at least one token for any non-empty string so budgeting never divides
/// by zero.
#[derive(Debug, Default, Clone)]
pub struct TokenCounter;

impl TokenCounter {
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        text.split_whitespace().count().max(1)
    }
}

#[derive(Debug, Error)]
#[error("Token budget exceeds model context window")]
pub struct BudgetExceededError;

impl From<BudgetExceededError> for ApiError {
    fn from(err: BudgetExceededError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// Allocates the token budget across prompt components and reports how
/// many tokens remain for retrieved context.
#[derive(Debug, Default, Clone)]
pub struct TokenBudgetAllocator;

impl TokenBudgetAllocator {
    fn context_window_for(&self, model: &str) -> usize {
        match model {
            "gpt-5-nano" => GENERATION_CONTEXT_WINDOW,
            _ => GENERATION_CONTEXT_WINDOW,
        }
    }

    pub fn allocate(
        &self,
        system_tokens: usize,
        query_tokens: usize,
        history_tokens: usize,
        examples_tokens: usize,
        response_budget: usize,
        model: &str,
    ) -> Result<TokenMetrics, BudgetExceededError> {
        let context_window = self.context_window_for(model);
        let total_fixed =
            system_tokens + query_tokens + history_tokens + examples_tokens + response_budget;

        if total_fixed > context_window {
            return Err(BudgetExceededError);
        }

        Ok(TokenMetrics {
            system_prompt: system_tokens,
            query: query_tokens,
            history: history_tokens,
            examples: examples_tokens,
            response_reserved: response_budget,
            available_for_context: context_window - total_fixed,
            total_used: total_fixed,
            context_window,
            context_tokens: 0,
            chunks_included: 0,
            chunks_truncated: 0,
        })
    }
}

/// Formats chunks with `[Source N]` markers and builds citation maps.
#[derive(Debug, Default, Clone)]
pub struct CitationFormatter;

impl CitationFormatter {
    /// `[Source 1] File: policy.pdf, Page 3, Introduction\n<content>\n`
    pub fn format_chunk(&self, chunk: &RetrievedChunk, citation_index: u32) -> String {
        let mut header_parts = vec![format!("[Source {citation_index}]")];

        let source_file = chunk
            .metadata
            .source_filename
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        header_parts.push(format!("File: {source_file}"));
        header_parts.push(format!("Page {}", chunk.metadata.page_number));
        if let Some(section) = &chunk.metadata.section_title {
            header_parts.push(section.clone());
        }

        format!("{}\n{}\n", header_parts.join(", "), chunk.content)
    }

    pub fn citation_source(&self, chunk: &RetrievedChunk) -> CitationSource {
        CitationSource {
            chunk_id: chunk.chunk_id,
            document_id: chunk.document_id,
            source_file: chunk.metadata.source_filename.clone(),
            page: Some(chunk.metadata.page_number),
            section_title: chunk.metadata.section_title.clone(),
            similarity_score: chunk.similarity_score,
            preview: chunk.content.chars().take(150).collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ContextMetrics {
    pub context_tokens: usize,
    pub chunks_included: usize,
    pub chunks_truncated: usize,
}

/// Packs retrieved chunks into a context string within a token budget.
#[derive(Debug, Default, Clone)]
pub struct ContextAssembler;

impl ContextAssembler {
    /// Returns the context string, the indices (into the rank-sorted chunk
    /// list) of chunks actually used, and packing metrics. Citation
    /// indices are dense: the Nth used chunk is `[Source N]`.
    pub fn assemble<'a>(
        &self,
        sorted_chunks: &[&'a RetrievedChunk],
        available_tokens: usize,
        token_counter: &TokenCounter,
        formatter: &CitationFormatter,
    ) -> (String, Vec<&'a RetrievedChunk>, ContextMetrics) {
        let mut metrics = ContextMetrics::default();

        if available_tokens == 0 || sorted_chunks.is_empty() {
            return (String::new(), Vec::new(), metrics);
        }

        let mut remaining = available_tokens;
        let mut parts: Vec<String> = Vec::new();
        let mut used: Vec<&RetrievedChunk> = Vec::new();

        for &chunk in sorted_chunks {
            let citation_index = used.len() as u32 + 1;
            let formatted = formatter.format_chunk(chunk, citation_index);
            let tokens = token_counter.count(&formatted);

            if tokens <= remaining {
                parts.push(formatted);
                used.push(chunk);
                remaining -= tokens;
                metrics.chunks_included += 1;
                continue;
            }

            // The chunk overflows: truncate it into the leftover budget if
            // any remains, then stop packing either way.
            if remaining > 0 {
                let words: Vec<&str> = formatted.split_whitespace().collect();
                if words.is_empty() {
                    break;
                }
                let max_words = remaining.saturating_sub(1);
                let truncated_words = if max_words == 0 {
                    &words[..1]
                } else {
                    &words[..max_words.min(words.len())]
                };
                let truncated = format!("{} [...]\n", truncated_words.join(" "));
                let truncated_tokens = token_counter.count(&truncated);

                if truncated_tokens <= remaining {
                    parts.push(truncated);
                    used.push(chunk);
                    metrics.chunks_included += 1;
                    metrics.chunks_truncated += 1;
                }
            }
            break;
        }

        let context = parts.concat();
        metrics.context_tokens = token_counter.count(&context);

        (context, used, metrics)
    }
}

const SYSTEM_PROMPT: &str = "You are a helpful, accurate, and concise assistant.\n\n\
    When answering:\n\
    1. Use ONLY the provided context to form your answer.\n\
    2. Cite your sources using [Source N] markers.\n\
    3. If the context does not contain the answer, say so explicitly.\n\
    4. Be precise and avoid generalizations.";

const NO_CONTEXT_FALLBACK: &str =
    "No relevant context was retrieved. Answer based on general knowledge only if appropriate.\n";

/// High-level prompt construction from retrieved chunks.
#[derive(Debug, Default, Clone)]
pub struct PromptAssembler {
    token_counter: TokenCounter,
    budget_allocator: TokenBudgetAllocator,
    citation_formatter: CitationFormatter,
    context_assembler: ContextAssembler,
}

impl PromptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn construct_prompt(
        &self,
        request: &PromptRequest,
    ) -> Result<PromptResponse, BudgetExceededError> {
        let start = Instant::now();

        let system_tokens = self.token_counter.count(SYSTEM_PROMPT);
        let query_tokens = self.token_counter.count(&request.query_text);

        let mut token_metrics = self.budget_allocator.allocate(
            system_tokens,
            query_tokens,
            0,
            0,
            request.max_tokens_for_response,
            &request.model,
        )?;

        // Best chunks first: rank ascending, similarity descending.
        let mut sorted_chunks: Vec<&RetrievedChunk> = request.retrieved_chunks.iter().collect();
        sorted_chunks.sort_by(|a, b| {
            a.rank.cmp(&b.rank).then(
                b.similarity_score
                    .partial_cmp(&a.similarity_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });

        let (context, used_chunks, context_metrics) = self.context_assembler.assemble(
            &sorted_chunks,
            token_metrics.available_for_context,
            &self.token_counter,
            &self.citation_formatter,
        );

        let mut citation_map: BTreeMap<u32, CitationSource> = BTreeMap::new();
        for (index, chunk) in used_chunks.iter().enumerate() {
            citation_map.insert(
                index as u32 + 1,
                self.citation_formatter.citation_source(chunk),
            );
        }

        let context_section = if context.is_empty() {
            format!("---RETRIEVED CONTEXT---\n{NO_CONTEXT_FALLBACK}")
        } else {
            format!("---RETRIEVED CONTEXT---\n{context}\n")
        };
        let user_message = format!(
            "{context_section}\n---USER QUERY---\n{}",
            request.query_text
        );

        token_metrics.context_tokens = context_metrics.context_tokens;
        token_metrics.chunks_included = context_metrics.chunks_included;
        token_metrics.chunks_truncated = context_metrics.chunks_truncated;

        let assembly_latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        Ok(PromptResponse {
            request_id: request.request_id,
            system_message: SYSTEM_PROMPT.to_string(),
            user_message,
            citation_map,
            chunks_included: context_metrics.chunks_included,
            chunks_truncated: context_metrics.chunks_truncated,
            token_metrics,
            assembly_latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chunk::{ChunkMetadata, PositionRange};
    use uuid::Uuid;

    fn retrieved(content: &str, rank: u32, similarity: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: Uuid::new_v4(),
            content: content.to_string(),
            similarity_score: similarity,
            rank,
            retrieval_method: "dense".into(),
            document_id: Some(Uuid::new_v4()),
            metadata: ChunkMetadata {
                page_number: 3,
                position_in_page: PositionRange { start: 0, end: 10 },
                section_title: Some("Results".into()),
                document_type: None,
                source_filename: Some("paper.pdf".into()),
                language: Some("en".into()),
                chunk_index: Some(0),
                user_id: None,
                attributes: Default::default(),
            },
            quality_score: Some(0.8),
            embedding: None,
            embedding_model: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn request(chunks: Vec<RetrievedChunk>) -> PromptRequest {
        PromptRequest::new(
            "what were the results?".to_string(),
            chunks,
            "gpt-5-nano".to_string(),
        )
    }

    #[test]
    fn citation_map_is_dense_and_matches_markers() {
        let chunks = vec![
            retrieved("first chunk of text", 1, 0.9),
            retrieved("second chunk of text", 2, 0.7),
        ];
        let response = PromptAssembler::new()
            .construct_prompt(&request(chunks))
            .unwrap();

        let keys: Vec<u32> = response.citation_map.keys().copied().collect();
        assert_eq!(keys, vec![1, 2]);
        assert!(response.user_message.contains("[Source 1]"));
        assert!(response.user_message.contains("[Source 2]"));
        assert!(!response.user_message.contains("[Source 3]"));
    }

    #[test]
    fn format_includes_file_page_and_section() {
        let chunk = retrieved("body text", 1, 0.9);
        let formatted = CitationFormatter.format_chunk(&chunk, 1);
        assert!(formatted.starts_with("[Source 1], File: paper.pdf, Page 3, Results\n"));
        assert!(formatted.ends_with("body text\n"));
    }

    #[test]
    fn empty_retrieval_uses_fallback_context() {
        let response = PromptAssembler::new()
            .construct_prompt(&request(vec![]))
            .unwrap();
        assert!(response.user_message.contains("No relevant context"));
        assert!(response.citation_map.is_empty());
        assert_eq!(response.chunks_included, 0);
    }

    #[test]
    fn token_budget_is_accounted() {
        let response = PromptAssembler::new()
            .construct_prompt(&request(vec![retrieved("some words here", 1, 0.5)]))
            .unwrap();
        let metrics = &response.token_metrics;
        assert_eq!(metrics.context_window, GENERATION_CONTEXT_WINDOW);
        assert_eq!(metrics.response_reserved, 1500);
        assert_eq!(
            metrics.total_used,
            metrics.system_prompt + metrics.query + metrics.response_reserved
        );
        assert!(metrics.available_for_context > 0);
    }

    #[test]
    fn overflow_chunk_is_truncated_with_marker() {
        let counter = TokenCounter;
        let formatter = CitationFormatter;
        let big = retrieved(&"word ".repeat(100), 1, 0.9);
        let chunks = vec![&big];

        let (context, used, metrics) = ContextAssembler.assemble(&chunks, 20, &counter, &formatter);
        assert_eq!(used.len(), 1);
        assert_eq!(metrics.chunks_truncated, 1);
        assert!(context.ends_with("[...]\n"));
        assert!(counter.count(&context) <= 20);
    }

    #[test]
    fn chunks_beyond_budget_are_dropped() {
        let counter = TokenCounter;
        let formatter = CitationFormatter;
        let first = retrieved("short text", 1, 0.9);
        let second = retrieved(&"word ".repeat(50), 2, 0.8);
        let chunks = vec![&first, &second];

        let (_, used, metrics) = ContextAssembler.assemble(&chunks, 12, &counter, &formatter);
        // First fits whole; second truncates into the remainder.
        assert_eq!(metrics.chunks_included, used.len());
        assert!(used.len() <= 2);
    }

    #[test]
    fn oversized_fixed_budget_is_a_client_error() {
        let mut req = request(vec![]);
        req.max_tokens_for_response = GENERATION_CONTEXT_WINDOW + 1;
        assert!(PromptAssembler::new().construct_prompt(&req).is_err());
    }
}
