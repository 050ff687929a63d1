#![deny(missing_docs)]

//! Core library for the document chat server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Upload storage and PDF text extraction.
pub mod document;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// In-memory vector index and retriever.
pub mod index;
/// Chat-completions client used to generate answers.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Service counters.
pub mod metrics;
/// Document processing pipeline.
pub mod processing;
