//! Core data types and error definitions for the processing pipeline.

use crate::{
    document::DocumentError, embedding::EmbeddingClientError, index::IndexError,
    llm::ChatClientError,
};
use serde::Serialize;
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible length budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Errors emitted by the upload and question pipelines.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// A question arrived before any document was indexed.
    #[error("No document uploaded or processed yet")]
    NoDocument,
    /// The question was missing or blank.
    #[error("No question provided")]
    EmptyQuestion,
    /// Storing or parsing the upload failed.
    #[error(transparent)]
    Document(#[from] DocumentError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// The vector index rejected the embeddings.
    #[error("Failed to build index: {0}")]
    Index(#[from] IndexError),
    /// The chat provider failed to answer.
    #[error(transparent)]
    Chat(#[from] ChatClientError),
}

/// Metadata describing the currently indexed document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentStatus {
    /// Identifier assigned when the document was indexed.
    pub document_id: String,
    /// Sanitised file name of the upload.
    pub file_name: String,
    /// Hex-encoded SHA-256 of the uploaded bytes.
    pub sha256: String,
    /// Upload size in bytes.
    pub size_bytes: usize,
    /// Where the upload was written on disk.
    pub stored_path: String,
    /// Pages in the source document.
    pub pages: usize,
    /// Characters of extracted text.
    pub characters: usize,
    /// Chunks held by the index.
    pub chunks: usize,
    /// Duplicate chunks dropped before embedding.
    pub skipped_duplicates: usize,
    /// Chunk budget used for splitting.
    pub chunk_size: usize,
    /// Overlap budget used for splitting.
    pub chunk_overlap: usize,
    /// RFC 3339 timestamp of indexing.
    pub indexed_at: String,
}

/// Chunk that contributed context to an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    /// Position of the chunk within the document.
    pub chunk: usize,
    /// Cosine similarity between the question and the chunk.
    pub score: f32,
}

/// Answer produced by [`crate::processing::DocumentService::answer_question`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Text returned by the chat model.
    pub answer: String,
    /// Retrieved chunks, best match first.
    pub sources: Vec<SourceRef>,
}
