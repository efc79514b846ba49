pub mod chunk;
pub mod document;
pub mod embedding;
pub mod generation;
pub mod ingestion;
pub mod prompt;
pub mod query;

pub use chunk::{Chunk, ChunkMetadata, ChunkingConfig, ChunkingResult, ChunkingStrategy};
pub use document::{ExtractedDocument, ExtractedPage, FileFormat};
pub use embedding::{
    BatchEmbeddingConfig, Embedding, EmbeddingFailure, EmbeddingInput, EmbeddingResult,
};
pub use generation::{
    CitationEntry, QueryGenerationMetadata, QueryGenerationRequest, QueryGenerationResponse,
    UsedChunk,
};
pub use ingestion::{
    DocumentMetadata, ErrorStage, IngestionConfig, IngestionJob, IngestionResponse,
    IngestionStatus, UploadedFileInfo,
};
pub use prompt::{CitationSource, PromptRequest, PromptResponse, TokenMetrics};
pub use query::{QueryMetrics, QueryOutcome, RetrievedChunk};
