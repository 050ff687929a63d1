//! Upload storage and text extraction for uploaded documents.

mod loader;
mod storage;

pub use loader::{DocumentLoader, LoadedDocument, PdfLoader, is_pdf};
pub use storage::{StoredUpload, sanitize_file_name, store_upload};

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while storing or reading an uploaded document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The client-supplied file name has no usable final component.
    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),
    /// The upload carried no bytes.
    #[error("Uploaded file '{0}' is empty")]
    EmptyUpload(String),
    /// The upload is not a PDF.
    #[error("Unsupported document type for '{0}': only PDF files are accepted")]
    UnsupportedType(String),
    /// Writing the upload to disk failed.
    #[error("Failed to store upload at {path:?}: {source}")]
    Io {
        /// Destination path of the failed write.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The PDF parser rejected the document.
    #[error("Failed to extract text from PDF: {0}")]
    Extraction(String),
    /// The document parsed but contained no text.
    #[error("Document '{0}' contains no extractable text")]
    NoText(String),
}
