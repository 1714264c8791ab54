//! Core data types and error definitions for the processing pipeline.

use crate::completion::CompletionClientError;
use crate::embedding::EmbeddingClientError;
use crate::index::IndexError;
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible chunk budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Errors emitted by indexing, retrieval, and quiz generation.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Completion provider failed to produce a reply.
    #[error(transparent)]
    Completion(#[from] CompletionClientError),
    /// Reading or writing the document index failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Embedding provider returned no vector for a query.
    #[error("Embedding provider returned no vectors for the query")]
    EmptyEmbedding,
}

/// Tunables consumed by [`crate::processing::StudyService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingSettings {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters carried over from the previous chunk.
    pub chunk_overlap: usize,
    /// Chunks embedded and written per batch.
    pub embedding_batch_size: usize,
    /// Leading chunks used to build the summary prompt.
    pub summary_sample_size: usize,
    /// Chunks randomly sampled for the quiz prompt.
    pub quiz_sample_size: usize,
    /// Chunks retrieved when answering a question.
    pub ask_top_k: usize,
}

impl ProcessingSettings {
    /// Read the processing tunables out of the runtime configuration.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            chunk_size: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap,
            embedding_batch_size: config.embedding_batch_size.max(1),
            summary_sample_size: config.summary_sample_size,
            quiz_sample_size: config.quiz_sample_size,
            ask_top_k: config.ask_top_k.max(1),
        }
    }
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self::from_config(&crate::config::Config::default())
    }
}

/// Result of a successful indexing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingOutcome {
    /// Number of chunks written to the index.
    pub chunk_count: usize,
    /// Generated document summary.
    pub summary: String,
}
