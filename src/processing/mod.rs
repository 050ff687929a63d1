//! Document pipeline: chunking, embedding, indexing, and question answering.

pub mod chunking;
mod mappers;
mod prompt;
mod service;
pub mod types;

pub use service::{DocumentApi, DocumentService, PipelineSettings};
pub use types::{Answer, ChunkingError, DocumentStatus, ProcessingError, SourceRef};
