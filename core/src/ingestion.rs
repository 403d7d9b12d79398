//! C5 — Ingestion pipeline: extract -> chunk -> embed -> persist, for one
//! document at a time. Idempotent (safe to call again on a failed or
//! still-pending document) and mutually exclusive across concurrent callers
//! via a compare-and-swap status transition at the store layer.

use crate::chunker;
use crate::config::{ChunkConfig, IngestConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::IngestError;
use crate::extractor;
use crate::models::{DocumentStatus, FileKind, IngestReport, NewChunk};
use crate::store::ChunkStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{info, warn};

const EMBED_CONCURRENCY: usize = 8;

pub struct IngestionPipeline {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunk_config: ChunkConfig,
    ingest_config: IngestConfig,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunk_config: ChunkConfig,
        ingest_config: IngestConfig,
    ) -> Self {
        IngestionPipeline {
            store,
            embedder,
            chunk_config,
            ingest_config,
        }
    }

    /// Runs the full pipeline for `document_id`. Returns a terminal
    /// [`IngestReport`] in every case, including when the document could
    /// not be claimed because another ingestion is already in flight —
    /// only a malformed call (unknown document) propagates an [`IngestError`]
    /// directly. Re-ingesting a `completed` document is allowed: the claim
    /// accepts `pending`, `failed`, and `completed` as eligible starting
    /// states, so `ingest(id)` can always be called again.
    pub async fn ingest(&self, document_id: i64) -> Result<IngestReport, IngestError> {
        let claimed = self
            .store
            .try_transition_status(
                document_id,
                &[DocumentStatus::Pending, DocumentStatus::Failed, DocumentStatus::Completed],
                DocumentStatus::Processing,
                None,
            )
            .await?;
        if !claimed {
            warn!(document_id, "ingestion already in progress");
            return Ok(IngestReport {
                document_id,
                status: DocumentStatus::Processing,
                chunks_created: 0,
                error: Some(IngestError::AlreadyInProgress(document_id).to_string()),
            });
        }

        let soft_deadline = Duration::from_secs(self.ingest_config.soft_deadline_sec);
        let hard_deadline = Duration::from_secs(self.ingest_config.hard_deadline_sec);

        match timeout(hard_deadline, self.run_inner(document_id, soft_deadline)).await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(err)) => {
                self.mark_failed(document_id, &err.to_string()).await;
                Ok(IngestReport {
                    document_id,
                    status: DocumentStatus::Failed,
                    chunks_created: 0,
                    error: Some(err.to_string()),
                })
            }
            Err(_) => {
                self.mark_failed(document_id, "ingestion exceeded hard deadline").await;
                Ok(IngestReport {
                    document_id,
                    status: DocumentStatus::Failed,
                    chunks_created: 0,
                    error: Some("ingestion exceeded hard deadline".to_string()),
                })
            }
        }
    }

    async fn mark_failed(&self, document_id: i64, message: &str) {
        if let Err(e) = self
            .store
            .finish_processing(document_id, DocumentStatus::Failed, 0, Some(message))
            .await
        {
            warn!(document_id, error = %e, "failed to record ingestion failure");
        }
    }

    async fn run_inner(
        &self,
        document_id: i64,
        _soft_deadline: Duration,
    ) -> Result<IngestReport, IngestError> {
        let document = self.store.get_document(document_id).await?;
        let path = Path::new(&document.file_path);
        let kind = FileKind::from_extension(&document.file_type)
            .ok_or_else(|| IngestError::Extract(crate::error::ExtractError::UnsupportedFormat(
                document.file_type.clone(),
            )))?;

        let text = extractor::extract(path, kind)?;

        let raw_chunks = chunker::split(
            &text,
            self.chunk_config.size,
            self.chunk_config.overlap,
            self.chunk_config.min_size,
        );
        if raw_chunks.is_empty() {
            return Err(IngestError::NoChunks);
        }

        let embedded = self.embed_all(&raw_chunks).await;
        if embedded.is_empty() {
            return Err(IngestError::NoEmbeddings);
        }

        self.store.delete_chunks(document_id).await?;
        for batch in embedded.chunks(self.ingest_config.batch_size) {
            self.store.insert_chunks(document_id, batch).await?;
        }

        let chunks_created = embedded.len();
        self.store
            .finish_processing(document_id, DocumentStatus::Completed, chunks_created as i32, None)
            .await?;

        info!(document_id, chunks_created, "ingestion completed");
        Ok(IngestReport {
            document_id,
            status: DocumentStatus::Completed,
            chunks_created,
            error: None,
        })
    }

    /// Embeds every chunk concurrently (bounded by [`EMBED_CONCURRENCY`]),
    /// skipping chunks whose embedding fails, while preserving the original
    /// chunk order in the returned vector.
    async fn embed_all(&self, raw_chunks: &[String]) -> Vec<NewChunk> {
        let semaphore = Arc::new(Semaphore::new(EMBED_CONCURRENCY));
        let mut tasks = Vec::with_capacity(raw_chunks.len());

        for (index, content) in raw_chunks.iter().enumerate() {
            let embedder = self.embedder.clone();
            let semaphore = semaphore.clone();
            let content = content.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                let embedding = embedder.embed_one(&content).await;
                (index, content, embedding)
            }));
        }

        let mut results: Vec<Option<NewChunk>> = vec![None; raw_chunks.len()];
        for task in tasks {
            match task.await {
                Ok((index, content, Ok(embedding))) => {
                    let content_length = content.chars().count() as i32;
                    results[index] = Some(NewChunk {
                        chunk_index: index as i32,
                        content,
                        content_length,
                        embedding,
                    });
                }
                Ok((index, _, Err(e))) => {
                    warn!(chunk_index = index, error = %e, "skipping chunk: embedding failed");
                }
                Err(e) => warn!(error = %e, "embedding task panicked"),
            }
        }

        results.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::error::{EmbedError, StoreError};
    use crate::models::{Document, SearchFilter};
    use crate::store::ChunkStore;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::Mutex;

    struct FakeStore {
        document: Mutex<Document>,
        chunks: Mutex<Vec<NewChunk>>,
    }

    impl FakeStore {
        fn new(file_path: String) -> Self {
            let now = chrono::Utc::now();
            FakeStore {
                document: Mutex::new(Document {
                    id: 1,
                    filename: "doc".to_string(),
                    original_filename: "doc.txt".to_string(),
                    file_path,
                    file_size: 0,
                    file_type: "txt".to_string(),
                    title: "Doc".to_string(),
                    description: None,
                    processing_status: DocumentStatus::Pending,
                    chunks_count: None,
                    error_message: None,
                    created_at: now,
                    updated_at: now,
                    processed_at: None,
                }),
                chunks: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChunkStore for FakeStore {
        async fn create_document(
            &self,
            _doc: crate::models::NewDocument,
            _uploads_dir: &str,
        ) -> Result<Document, StoreError> {
            unimplemented!("not exercised by ingestion tests")
        }

        async fn try_transition_status(
            &self,
            _document_id: i64,
            from: &[DocumentStatus],
            to: DocumentStatus,
            error_message: Option<&str>,
        ) -> Result<bool, StoreError> {
            let mut doc = self.document.lock().unwrap();
            if from.contains(&doc.processing_status) {
                doc.processing_status = to;
                doc.error_message = error_message.map(str::to_string);
                Ok(true)
            } else {
                Ok(false)
            }
        }

        async fn delete_chunks(&self, _document_id: i64) -> Result<(), StoreError> {
            self.chunks.lock().unwrap().clear();
            Ok(())
        }

        async fn insert_chunks(&self, _document_id: i64, chunks: &[NewChunk]) -> Result<(), StoreError> {
            self.chunks.lock().unwrap().extend_from_slice(chunks);
            Ok(())
        }

        async fn finish_processing(
            &self,
            _document_id: i64,
            status: DocumentStatus,
            chunks_count: i32,
            error_message: Option<&str>,
        ) -> Result<(), StoreError> {
            let mut doc = self.document.lock().unwrap();
            doc.processing_status = status;
            doc.chunks_count = Some(chunks_count);
            doc.error_message = error_message.map(str::to_string);
            Ok(())
        }

        async fn get_document(&self, _document_id: i64) -> Result<Document, StoreError> {
            Ok(self.document.lock().unwrap().clone())
        }

        async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
            Ok(vec![self.document.lock().unwrap().clone()])
        }

        async fn delete_document(&self, _document_id: i64) -> Result<(), StoreError> {
            Ok(())
        }

        async fn search_vector(
            &self,
            _query_embedding: &[f32],
            _filter: SearchFilter,
            _limit: usize,
        ) -> Result<Vec<(crate::models::Chunk, String, f32)>, StoreError> {
            Ok(Vec::new())
        }

        async fn search_text(
            &self,
            _keywords: &[String],
            _filter: SearchFilter,
            _limit: usize,
        ) -> Result<Vec<(crate::models::Chunk, String, f32)>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            Ok(vec![text.len() as f32])
        }

        fn dimension(&self) -> usize {
            1
        }
    }

    fn write_temp_txt(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{content}").unwrap();
        f
    }

    #[tokio::test]
    async fn full_pipeline_completes_and_marks_document_completed() {
        let file = write_temp_txt(&"Sentence one. Sentence two. Sentence three. ".repeat(50));
        let store: Arc<dyn ChunkStore> = Arc::new(FakeStore::new(file.path().display().to_string()));
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbedder);
        let pipeline = IngestionPipeline::new(
            store.clone(),
            embedder,
            ChunkConfig::default(),
            IngestConfig::default(),
        );

        let report = pipeline.ingest(1).await.unwrap();
        assert_eq!(report.status, DocumentStatus::Completed);
        assert!(report.chunks_created > 0);

        let doc = store.get_document(1).await.unwrap();
        assert_eq!(doc.processing_status, DocumentStatus::Completed);
        assert_eq!(doc.chunks_count, Some(report.chunks_created as i32));
    }

    #[tokio::test]
    async fn rejects_concurrent_ingestion_of_same_document() {
        let file = write_temp_txt("short text");
        let store: Arc<dyn ChunkStore> = Arc::new(FakeStore::new(file.path().display().to_string()));
        // Pre-mark as already processing to simulate a concurrent in-flight call.
        store
            .try_transition_status(1, &[DocumentStatus::Pending], DocumentStatus::Processing, None)
            .await
            .unwrap();

        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbedder);
        let pipeline = IngestionPipeline::new(
            store,
            embedder,
            ChunkConfig::default(),
            IngestConfig::default(),
        );

        let report = pipeline.ingest(1).await.unwrap();
        assert!(report.error.is_some());
        assert_eq!(report.chunks_created, 0);
    }

    #[tokio::test]
    async fn allows_reingesting_a_completed_document() {
        let file = write_temp_txt(&"Sentence one. Sentence two. ".repeat(50));
        let store: Arc<dyn ChunkStore> = Arc::new(FakeStore::new(file.path().display().to_string()));
        store
            .try_transition_status(1, &[DocumentStatus::Pending], DocumentStatus::Completed, None)
            .await
            .unwrap();

        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbedder);
        let pipeline = IngestionPipeline::new(
            store,
            embedder,
            ChunkConfig::default(),
            IngestConfig::default(),
        );

        let report = pipeline.ingest(1).await.unwrap();
        assert_eq!(report.status, DocumentStatus::Completed);
        assert!(report.chunks_created > 0);
    }
}
