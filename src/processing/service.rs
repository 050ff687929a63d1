//! Document service coordinating upload storage, indexing, retrieval, and answering.

use crate::{
    config::{Config, LengthUnit},
    document::{DocumentError, DocumentLoader, PdfLoader, is_pdf, store_upload},
    embedding::{EmbeddingClient, build_embedding_client, embed_in_batches},
    index::{IndexedChunk, Retriever, VectorIndex},
    llm::{ChatClient, ChatRequest, build_chat_client},
    metrics::{MetricsSnapshot, ServiceMetrics},
    processing::{
        chunking::chunk_text,
        mappers::{current_timestamp_rfc3339, dedupe_chunks},
        prompt::render_prompt,
        types::{Answer, DocumentStatus, ProcessingError, SourceRef},
    },
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Pipeline knobs derived from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Directory uploads are written to.
    pub data_dir: PathBuf,
    /// Chunk budget.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks.
    pub chunk_overlap: usize,
    /// Unit chunk budgets are measured in.
    pub length_unit: LengthUnit,
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Texts per embedding request.
    pub embedding_batch_size: usize,
    /// Expected embedding dimension, when configured.
    pub embedding_dimension: Option<usize>,
}

impl PipelineSettings {
    /// Extract pipeline settings from the runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            chunk_size: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap,
            length_unit: config.text_splitter_unit,
            top_k: config.retriever_top_k,
            embedding_batch_size: config.embedding_batch_size,
            embedding_dimension: config.embedding_dimension,
        }
    }
}

/// The indexed document currently answering questions.
struct ActiveDocument {
    status: DocumentStatus,
    retriever: Retriever,
}

/// Owns the embedding and chat clients plus the single active document.
///
/// Each successful upload replaces the active document wholesale; a failed upload leaves the
/// previous one untouched. Uploads are serialised, while questions only take a read lock long
/// enough to clone the active document handle.
pub struct DocumentService {
    settings: PipelineSettings,
    embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
    chat_client: Box<dyn ChatClient + Send + Sync>,
    loader: Box<dyn DocumentLoader>,
    active: RwLock<Option<Arc<ActiveDocument>>>,
    ingest_lock: Mutex<()>,
    metrics: Arc<ServiceMetrics>,
}

/// Abstraction over the document pipeline used by the HTTP surface.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Store, parse, chunk, embed, and index an uploaded document, replacing the active one.
    async fn ingest_document(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentStatus, ProcessingError>;

    /// Answer a question from the active document.
    async fn answer_question(&self, question: &str) -> Result<Answer, ProcessingError>;

    /// Metadata of the active document, if any.
    async fn status(&self) -> Option<DocumentStatus>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl DocumentService {
    /// Assemble a service from explicit components.
    pub fn new(
        settings: PipelineSettings,
        embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
        chat_client: Box<dyn ChatClient + Send + Sync>,
        loader: Box<dyn DocumentLoader>,
    ) -> Self {
        Self {
            settings,
            embedding_client,
            chat_client,
            loader,
            active: RwLock::new(None),
            ingest_lock: Mutex::new(()),
            metrics: Arc::new(ServiceMetrics::new()),
        }
    }

    /// Build the service described by the runtime configuration, using the PDF loader.
    pub fn from_config(config: &Config) -> Result<Self, ProcessingError> {
        tracing::info!("Initializing embedding client");
        let embedding_client = build_embedding_client(config)?;
        tracing::info!("Initializing chat client");
        let chat_client = build_chat_client(config)?;
        Ok(Self::new(
            PipelineSettings::from_config(config),
            embedding_client,
            chat_client,
            Box::new(PdfLoader::new()),
        ))
    }

    /// Store, parse, chunk, embed, and index a document, then make it the active document.
    pub async fn ingest_document(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentStatus, ProcessingError> {
        if bytes.is_empty() {
            return Err(DocumentError::EmptyUpload(file_name.to_string()).into());
        }
        if !is_pdf(file_name, &bytes) {
            return Err(DocumentError::UnsupportedType(file_name.to_string()).into());
        }

        let _guard = self.ingest_lock.lock().await;
        let result = self.build_active_document(file_name, bytes).await;
        match result {
            Ok(active) => {
                let status = active.status.clone();
                *self.active.write().await = Some(Arc::new(active));
                self.metrics.record_document(status.chunks as u64);
                tracing::info!(
                    document_id = %status.document_id,
                    file = %status.file_name,
                    chunks = status.chunks,
                    skipped_duplicates = status.skipped_duplicates,
                    "Document indexed"
                );
                Ok(status)
            }
            Err(error) => {
                self.metrics.record_failure();
                tracing::warn!(file = file_name, error = %error, "Document ingestion failed");
                Err(error)
            }
        }
    }

    async fn build_active_document(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ActiveDocument, ProcessingError> {
        let settings = &self.settings;
        tracing::info!(file = file_name, size = bytes.len(), "Processing document");

        let stored = store_upload(&settings.data_dir, file_name, &bytes).await?;
        let loaded = self.loader.load(&stored.file_name, bytes).await?;
        let characters = loaded.characters();
        let pages = loaded.page_count();
        tracing::debug!(
            path = %stored.path.display(),
            pages,
            characters,
            "Loaded document text"
        );

        let chunks = chunk_text(
            &loaded.text,
            settings.chunk_size,
            settings.chunk_overlap,
            settings.length_unit,
        )?;
        let (prepared, skipped_duplicates) = dedupe_chunks(chunks);
        if prepared.is_empty() {
            return Err(DocumentError::NoText(stored.file_name).into());
        }
        tracing::debug!(
            chunks = prepared.len(),
            skipped_duplicates,
            chunk_size = settings.chunk_size,
            chunk_overlap = settings.chunk_overlap,
            unit = ?settings.length_unit,
            "Chunked document"
        );

        let vectors = embed_in_batches(
            self.embedding_client.as_ref(),
            prepared.clone(),
            settings.embedding_batch_size,
            settings.embedding_dimension,
        )
        .await?;

        let entries: Vec<IndexedChunk> = prepared
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(position, (text, vector))| IndexedChunk {
                position,
                text,
                vector,
            })
            .collect();
        let index = Arc::new(VectorIndex::from_entries(entries)?);

        let status = DocumentStatus {
            document_id: Uuid::new_v4().to_string(),
            file_name: stored.file_name,
            sha256: stored.sha256,
            size_bytes: stored.size_bytes,
            stored_path: stored.path.display().to_string(),
            pages,
            characters,
            chunks: index.len(),
            skipped_duplicates,
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
            indexed_at: current_timestamp_rfc3339(),
        };

        Ok(ActiveDocument {
            status,
            retriever: Retriever::new(index, settings.top_k),
        })
    }

    /// Retrieve the most relevant chunks for `question` and ask the chat model.
    pub async fn answer_question(&self, question: &str) -> Result<Answer, ProcessingError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ProcessingError::EmptyQuestion);
        }
        let active = self
            .active
            .read()
            .await
            .clone()
            .ok_or(ProcessingError::NoDocument)?;

        match self.answer_from(&active, question).await {
            Ok(answer) => {
                self.metrics.record_answer();
                Ok(answer)
            }
            Err(error) => {
                self.metrics.record_failure();
                tracing::warn!(
                    document_id = %active.status.document_id,
                    error = %error,
                    "Question answering failed"
                );
                Err(error)
            }
        }
    }

    async fn answer_from(
        &self,
        active: &ActiveDocument,
        question: &str,
    ) -> Result<Answer, ProcessingError> {
        let retriever = &active.retriever;
        let mut vectors = embed_in_batches(
            self.embedding_client.as_ref(),
            vec![question.to_string()],
            1,
            Some(retriever.index().dimension()),
        )
        .await?;
        let query = vectors.pop().unwrap_or_default();

        let hits = retriever.retrieve(&query)?;
        tracing::debug!(
            document_id = %active.status.document_id,
            hits = hits.len(),
            top_score = hits.first().map(|hit| hit.score),
            "Retrieved context"
        );

        let prompt = render_prompt(&hits, question);
        let answer = self
            .chat_client
            .complete(ChatRequest {
                system: None,
                prompt,
            })
            .await?;

        tracing::info!(
            document_id = %active.status.document_id,
            sources = hits.len(),
            "Question answered"
        );

        Ok(Answer {
            answer,
            sources: hits
                .into_iter()
                .map(|hit| SourceRef {
                    chunk: hit.position,
                    score: hit.score,
                })
                .collect(),
        })
    }

    /// Metadata of the active document, if any.
    pub async fn status(&self) -> Option<DocumentStatus> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|active| active.status.clone())
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn ingest_document(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentStatus, ProcessingError> {
        DocumentService::ingest_document(self, file_name, bytes).await
    }

    async fn answer_question(&self, question: &str) -> Result<Answer, ProcessingError> {
        DocumentService::answer_question(self, question).await
    }

    async fn status(&self) -> Option<DocumentStatus> {
        DocumentService::status(self).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        DocumentService::metrics_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::LoadedDocument;
    use crate::embedding::{EmbeddingClientError, HashEmbeddingClient};
    use crate::llm::ChatClientError;
    use std::sync::Mutex as StdMutex;

    struct StaticLoader;

    #[async_trait]
    impl DocumentLoader for StaticLoader {
        async fn load(
            &self,
            _file_name: &str,
            bytes: Vec<u8>,
        ) -> Result<LoadedDocument, DocumentError> {
            // Tests pass "%PDF-" followed by pages separated by form feeds.
            let text = String::from_utf8_lossy(&bytes[5..]).to_string();
            Ok(LoadedDocument::from_pages(
                text.split('\u{c}').map(str::to_string).collect(),
            ))
        }
    }

    #[derive(Default)]
    struct RecordingChat {
        prompts: StdMutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatClient for Arc<RecordingChat> {
        async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError> {
            if self.fail {
                return Err(ChatClientError::GenerationFailed("boom".into()));
            }
            self.prompts.lock().unwrap().push(request.prompt);
            Ok("Hello! Here is your answer.".into())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingClient for FailingEmbedder {
        async fn generate_embeddings(
            &self,
            _texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Err(EmbeddingClientError::ProviderUnavailable("offline".into()))
        }
    }

    fn settings(data_dir: PathBuf) -> PipelineSettings {
        PipelineSettings {
            data_dir,
            chunk_size: 60,
            chunk_overlap: 0,
            length_unit: LengthUnit::Chars,
            top_k: 2,
            embedding_batch_size: 4,
            embedding_dimension: Some(128),
        }
    }

    fn service(
        data_dir: PathBuf,
        chat: Arc<RecordingChat>,
        embedder: Box<dyn EmbeddingClient + Send + Sync>,
    ) -> DocumentService {
        DocumentService::new(
            settings(data_dir),
            embedder,
            Box::new(chat),
            Box::new(StaticLoader),
        )
    }

    fn pdf(text: &str) -> Vec<u8> {
        let mut bytes = b"%PDF-".to_vec();
        bytes.extend_from_slice(text.as_bytes());
        bytes
    }

    const LEASE: &str = "The monthly rent is twelve hundred dollars.\n\n\
        Pets are allowed with a deposit of three hundred dollars.\n\n\
        The lease term is twelve months starting in January.";

    #[tokio::test]
    async fn question_before_upload_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let service = service(
            temp.path().to_path_buf(),
            Arc::default(),
            Box::new(HashEmbeddingClient::new(128)),
        );
        let error = service
            .answer_question("What is the rent?")
            .await
            .expect_err("no document");
        assert!(matches!(error, ProcessingError::NoDocument));
        assert!(service.status().await.is_none());
    }

    #[tokio::test]
    async fn ingest_then_answer_uses_relevant_context() {
        let temp = tempfile::tempdir().expect("tempdir");
        let chat = Arc::new(RecordingChat::default());
        let service = service(
            temp.path().to_path_buf(),
            chat.clone(),
            Box::new(HashEmbeddingClient::new(128)),
        );

        let status = service
            .ingest_document("lease.pdf", pdf(LEASE))
            .await
            .expect("ingest");
        assert_eq!(status.file_name, "lease.pdf");
        assert_eq!(status.chunks, 3);
        assert_eq!(status.pages, 1);
        assert!(temp.path().join("lease.pdf").exists());
        assert_eq!(
            status.stored_path,
            temp.path().join("lease.pdf").display().to_string()
        );

        let answer = service
            .answer_question("  Are pets allowed with a deposit?  ")
            .await
            .expect("answer");
        assert_eq!(answer.answer, "Hello! Here is your answer.");
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].chunk, 1);

        let prompts = chat.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("You are a helpful assistant."));
        assert!(prompts[0].contains("Pets are allowed"));
        assert!(prompts[0].ends_with("Are pets allowed with a deposit?"));

        let metrics = service.metrics_snapshot();
        assert_eq!(metrics.documents_indexed, 1);
        assert_eq!(metrics.questions_answered, 1);
    }

    #[tokio::test]
    async fn new_upload_replaces_active_document() {
        let temp = tempfile::tempdir().expect("tempdir");
        let service = service(
            temp.path().to_path_buf(),
            Arc::default(),
            Box::new(HashEmbeddingClient::new(128)),
        );

        let first = service
            .ingest_document("lease.pdf", pdf(LEASE))
            .await
            .expect("first");
        let second = service
            .ingest_document(
                "memo.pdf",
                pdf("Quarterly revenue grew by four percent.\u{c}Costs were flat."),
            )
            .await
            .expect("second");

        let status = service.status().await.expect("active");
        assert_ne!(first.document_id, second.document_id);
        assert_eq!(status.file_name, "memo.pdf");
        assert_eq!(status.pages, 2);
    }

    #[tokio::test]
    async fn failed_upload_keeps_previous_document() {
        let temp = tempfile::tempdir().expect("tempdir");
        let service = service(
            temp.path().to_path_buf(),
            Arc::default(),
            Box::new(HashEmbeddingClient::new(128)),
        );
        service
            .ingest_document("lease.pdf", pdf(LEASE))
            .await
            .expect("ingest");

        let error = service
            .ingest_document("blank.pdf", pdf("   \n\n  "))
            .await
            .expect_err("blank document");
        assert!(matches!(
            error,
            ProcessingError::Document(DocumentError::NoText(_))
        ));
        assert_eq!(
            service.status().await.expect("still active").file_name,
            "lease.pdf"
        );
        assert_eq!(service.metrics_snapshot().failed_requests, 1);
    }

    #[tokio::test]
    async fn rejects_empty_and_non_pdf_uploads() {
        let temp = tempfile::tempdir().expect("tempdir");
        let service = service(
            temp.path().to_path_buf(),
            Arc::default(),
            Box::new(HashEmbeddingClient::new(128)),
        );

        let empty = service
            .ingest_document("empty.pdf", Vec::new())
            .await
            .expect_err("empty");
        assert!(matches!(
            empty,
            ProcessingError::Document(DocumentError::EmptyUpload(_))
        ));

        let text = service
            .ingest_document("notes.txt", b"plain".to_vec())
            .await
            .expect_err("not pdf");
        assert!(matches!(
            text,
            ProcessingError::Document(DocumentError::UnsupportedType(_))
        ));
        assert!(!temp.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let service = service(
            temp.path().to_path_buf(),
            Arc::default(),
            Box::new(HashEmbeddingClient::new(128)),
        );
        let error = service.answer_question(" \t").await.expect_err("blank");
        assert!(matches!(error, ProcessingError::EmptyQuestion));
    }

    #[tokio::test]
    async fn embedding_failure_surfaces_and_counts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let service = service(
            temp.path().to_path_buf(),
            Arc::default(),
            Box::new(FailingEmbedder),
        );
        let error = service
            .ingest_document("lease.pdf", pdf(LEASE))
            .await
            .expect_err("embedding offline");
        assert!(matches!(error, ProcessingError::Embedding(_)));
        assert!(service.status().await.is_none());
        assert_eq!(service.metrics_snapshot().failed_requests, 1);
    }

    #[tokio::test]
    async fn chat_failure_surfaces() {
        let temp = tempfile::tempdir().expect("tempdir");
        let chat = Arc::new(RecordingChat {
            prompts: StdMutex::new(Vec::new()),
            fail: true,
        });
        let service = service(
            temp.path().to_path_buf(),
            chat,
            Box::new(HashEmbeddingClient::new(128)),
        );
        service
            .ingest_document("lease.pdf", pdf(LEASE))
            .await
            .expect("ingest");
        let error = service
            .answer_question("What is the rent?")
            .await
            .expect_err("chat failure");
        assert!(matches!(error, ProcessingError::Chat(_)));
    }
}
