use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::models::generation::{CitationEntry, UsedChunk};
use crate::models::prompt::CitationSource;
use crate::models::query::RetrievedChunk;

static CITATION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[Source (\d+)\]").expect("static pattern"));

/// Extracts `[Source N]` markers from LLM answer text.
#[derive(Debug, Default, Clone)]
pub struct CitationExtractor;

impl CitationExtractor {
    /// Mapping of source index to byte positions of each occurrence.
    pub fn extract_citations(&self, answer_text: &str) -> BTreeMap<u32, Vec<(usize, usize)>> {
        let mut result: BTreeMap<u32, Vec<(usize, usize)>> = BTreeMap::new();

        for capture in CITATION_PATTERN.captures_iter(answer_text) {
            let Some(full) = capture.get(0) else { continue };
            let Some(index) = capture.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
                continue;
            };
            if index == 0 {
                continue;
            }
            result
                .entry(index)
                .or_default()
                .push((full.start(), full.end()));
        }

        result
    }
}

/// Validates extracted citations against the prompt's citation map.
#[derive(Debug, Default, Clone)]
pub struct CitationValidator;

impl CitationValidator {
    pub fn validate(
        &self,
        extracted: &BTreeMap<u32, Vec<(usize, usize)>>,
        citation_map: &BTreeMap<u32, CitationSource>,
        retrieved_chunks: &[RetrievedChunk],
    ) -> (Vec<CitationEntry>, Vec<String>) {
        let mut citations: Vec<CitationEntry> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        let chunk_by_id: HashMap<Uuid, &RetrievedChunk> = retrieved_chunks
            .iter()
            .map(|chunk| (chunk.chunk_id, chunk))
            .collect();

        for index in extracted.keys() {
            let Some(source) = citation_map.get(index) else {
                warnings.push(format!("Missing citation for [Source {index}]"));
                continue;
            };

            let chunk = chunk_by_id.get(&source.chunk_id);
            let preview = if source.preview.is_empty() {
                chunk
                    .map(|c| c.content.chars().take(150).collect())
                    .unwrap_or_default()
            } else {
                source.preview.clone()
            };

            citations.push(CitationEntry {
                source_index: *index,
                chunk_id: source.chunk_id,
                document_id: source.document_id,
                source_file: source.source_file.clone(),
                page: source.page,
                similarity_score: source.similarity_score,
                preview,
            });
        }

        (citations, warnings)
    }
}

/// Result of post-processing an LLM answer.
#[derive(Debug, Clone)]
pub struct ProcessedAnswer {
    pub answer: String,
    pub citations: Vec<CitationEntry>,
    pub used_chunks: Vec<UsedChunk>,
    pub warnings: Vec<String>,
}

/// Post-processes LLM responses into answer, citations, and used chunks.
#[derive(Debug, Default, Clone)]
pub struct AnswerProcessor {
    extractor: CitationExtractor,
    validator: CitationValidator,
}

impl AnswerProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(
        &self,
        llm_response: &str,
        citation_map: &BTreeMap<u32, CitationSource>,
        retrieved_chunks: &[RetrievedChunk],
    ) -> ProcessedAnswer {
        let answer = llm_response.trim().to_string();

        let extracted = self.extractor.extract_citations(&answer);
        let (citations, warnings) =
            self.validator
                .validate(&extracted, citation_map, retrieved_chunks);

        // One UsedChunk per distinct chunk referenced by the citation map,
        // in ascending citation-index order.
        let chunk_by_id: HashMap<Uuid, &RetrievedChunk> = retrieved_chunks
            .iter()
            .map(|chunk| (chunk.chunk_id, chunk))
            .collect();

        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut used_chunks: Vec<UsedChunk> = Vec::new();

        for source in citation_map.values() {
            if !seen.insert(source.chunk_id) {
                continue;
            }

            let used = match chunk_by_id.get(&source.chunk_id) {
                Some(chunk) => UsedChunk {
                    chunk_id: chunk.chunk_id,
                    rank: chunk.rank,
                    similarity_score: chunk.similarity_score,
                    content_preview: chunk.content.chars().take(100).collect(),
                },
                None => UsedChunk {
                    chunk_id: source.chunk_id,
                    rank: 0,
                    similarity_score: source.similarity_score,
                    content_preview: source.preview.chars().take(100).collect(),
                },
            };
            used_chunks.push(used);
        }

        ProcessedAnswer {
            answer,
            citations,
            used_chunks,
            warnings,
        }
    }
}
