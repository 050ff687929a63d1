use super::DocumentError;
use async_trait::async_trait;

/// Text extracted from an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    /// Full document text; pages are separated by a blank line.
    pub text: String,
    /// Normalised text of each page, in document order. Blank pages are kept as empty strings.
    pub pages: Vec<String>,
}

impl LoadedDocument {
    /// Normalise each page and join the non-empty ones with a paragraph break.
    pub fn from_pages(pages: Vec<String>) -> Self {
        let pages: Vec<String> = pages.iter().map(|page| normalize_text(page)).collect();
        let text = pages
            .iter()
            .filter(|page| !page.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n\n");
        Self { text, pages }
    }

    /// Number of characters of extracted text.
    pub fn characters(&self) -> usize {
        self.text.chars().count()
    }

    /// Number of pages in the source document.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Turns raw upload bytes into text.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Extract the text of `bytes`; `file_name` is used for diagnostics only.
    async fn load(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<LoadedDocument, DocumentError>;
}

/// PDF loader backed by `pdf-extract`.
///
/// Parsing is CPU-bound and may panic on malformed input, so it runs on the blocking pool and
/// a panic is reported as an extraction error.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfLoader;

impl PdfLoader {
    /// Construct a PDF loader.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    async fn load(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<LoadedDocument, DocumentError> {
        if !is_pdf(file_name, &bytes) {
            return Err(DocumentError::UnsupportedType(file_name.to_string()));
        }

        let size = bytes.len();
        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        })
        .await
        .map_err(|error| DocumentError::Extraction(format!("PDF parser aborted: {error}")))?
        .map_err(|error| DocumentError::Extraction(error.to_string()))?;

        let document = LoadedDocument::from_pages(pages);
        if document.text.is_empty() {
            return Err(DocumentError::NoText(file_name.to_string()));
        }

        tracing::debug!(
            file = file_name,
            size,
            pages = document.page_count(),
            characters = document.characters(),
            "Extracted PDF text"
        );
        Ok(document)
    }
}

/// Returns true when the name carries a `.pdf` extension or the bytes start with `%PDF-`.
pub fn is_pdf(file_name: &str, head: &[u8]) -> bool {
    head.starts_with(b"%PDF-") || file_name.to_ascii_lowercase().ends_with(".pdf")
}

/// Collapse runs of blank lines and trailing spaces left behind by PDF text extraction.
fn normalize_text(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        normalized.push_str(line);
        normalized.push('\n');
    }
    normalized.trim().to_string()
}
