//! C4 — Chunk store. Postgres-backed persistence for documents and chunks,
//! with `pgvector` cosine search over an HNSW index. Grounded in the
//! migration scripts that set up `vector(312)` columns with
//! `USING hnsw (embedding vector_cosine_ops) WITH (m=16, ef_construction=64)`.

use crate::error::StoreError;
use crate::models::{Chunk, Document, DocumentStatus, NewChunk, NewDocument, SearchFilter};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::PgPool;
use tracing::warn;

/// Persistence boundary for documents and chunks. A trait so the ingestion
/// pipeline and retriever can be exercised against an in-memory fake without
/// a live database.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Creates the document row, storing it under `uploads_dir` as
    /// `<uploads_dir>/<unix_timestamp>_<original_filename>`.
    async fn create_document(&self, doc: NewDocument, uploads_dir: &str) -> Result<Document, StoreError>;

    /// Atomically transitions a document's status, but only if its current
    /// status is one of `from`. Returns `Ok(false)` (not an error) if no row
    /// matched — the caller uses this as a compare-and-swap lock so two
    /// ingestion attempts on the same document never run concurrently.
    async fn try_transition_status(
        &self,
        document_id: i64,
        from: &[DocumentStatus],
        to: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<bool, StoreError>;

    async fn delete_chunks(&self, document_id: i64) -> Result<(), StoreError>;

    async fn insert_chunks(&self, document_id: i64, chunks: &[NewChunk]) -> Result<(), StoreError>;

    async fn finish_processing(
        &self,
        document_id: i64,
        status: DocumentStatus,
        chunks_count: i32,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn get_document(&self, document_id: i64) -> Result<Document, StoreError>;

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError>;

    async fn delete_document(&self, document_id: i64) -> Result<(), StoreError>;

    async fn search_vector(
        &self,
        query_embedding: &[f32],
        filter: SearchFilter,
        limit: usize,
    ) -> Result<Vec<(Chunk, String, f32)>, StoreError>;

    async fn search_text(
        &self,
        keywords: &[String],
        filter: SearchFilter,
        limit: usize,
    ) -> Result<Vec<(Chunk, String, f32)>, StoreError>;
}

pub struct PgChunkStore {
    pool: PgPool,
}

impl PgChunkStore {
    pub fn new(pool: PgPool) -> Self {
        PgChunkStore { pool }
    }
}

#[async_trait]
impl ChunkStore for PgChunkStore {
    async fn create_document(&self, doc: NewDocument, uploads_dir: &str) -> Result<Document, StoreError> {
        let filename = format!("{}_{}", chrono::Utc::now().timestamp(), doc.original_filename);
        let file_path = format!("{uploads_dir}/{filename}");
        let record = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents
                (filename, original_filename, file_path, file_size, file_type,
                 title, description, processing_status, created_at, updated_at)
            VALUES ($1, $2, $3, 0, $4, $5, $6, 'pending', now(), now())
            RETURNING id, filename, original_filename, file_path, file_size, file_type,
                      title, description, processing_status, chunks_count, error_message,
                      created_at, updated_at, processed_at
            "#,
        )
        .bind(&filename)
        .bind(&doc.original_filename)
        .bind(&file_path)
        .bind(&doc.file_type)
        .bind(&doc.title)
        .bind(&doc.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn try_transition_status(
        &self,
        document_id: i64,
        from: &[DocumentStatus],
        to: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<bool, StoreError> {
        let from_strs: Vec<&str> = from.iter().map(DocumentStatus::as_str).collect();
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET processing_status = $1, error_message = $2, updated_at = now()
            WHERE id = $3 AND processing_status = ANY($4)
            "#,
        )
        .bind(to.as_str())
        .bind(error_message)
        .bind(document_id)
        .bind(&from_strs)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_chunks(&self, document_id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_chunks(&self, document_id: i64, chunks: &[NewChunk]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            let embedding = Vector::from(chunk.embedding.clone());
            sqlx::query(
                r#"
                INSERT INTO chunks (document_id, chunk_index, content, content_length, embedding, created_at)
                VALUES ($1, $2, $3, $4, $5, now())
                "#,
            )
            .bind(document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.content_length)
            .bind(embedding)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn finish_processing(
        &self,
        document_id: i64,
        status: DocumentStatus,
        chunks_count: i32,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE documents
            SET processing_status = $1, chunks_count = $2, error_message = $3,
                processed_at = now(), updated_at = now()
            WHERE id = $4
            "#,
        )
        .bind(status.as_str())
        .bind(chunks_count)
        .bind(error_message)
        .bind(document_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, document_id: i64) -> Result<Document, StoreError> {
        sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::DocumentNotFound(document_id))
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        let docs = sqlx::query_as::<_, Document>("SELECT * FROM documents ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(docs)
    }

    async fn delete_document(&self, document_id: i64) -> Result<(), StoreError> {
        let document = self.get_document(document_id).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::DocumentNotFound(document_id));
        }
        tx.commit().await?;

        if let Err(e) = tokio::fs::remove_file(&document.file_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(document_id, error = %e, "failed to remove document file from disk");
            }
        }
        Ok(())
    }

    async fn search_vector(
        &self,
        query_embedding: &[f32],
        filter: SearchFilter,
        limit: usize,
    ) -> Result<Vec<(Chunk, String, f32)>, StoreError> {
        let query_vec = Vector::from(query_embedding.to_vec());
        let rows = sqlx::query_as::<_, ChunkRow>(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.content, c.content_length,
                   c.embedding as "embedding: Vector", c.created_at,
                   d.title as document_title,
                   1 - (c.embedding <=> $1) as similarity
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE d.processing_status = $2 AND c.content_length > $3
            ORDER BY c.embedding <=> $1
            LIMIT $4
            "#,
        )
        .bind(&query_vec)
        .bind(filter.status.as_str())
        .bind(filter.min_content_length)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ChunkRow::into_tuple).collect())
    }

    async fn search_text(
        &self,
        keywords: &[String],
        filter: SearchFilter,
        limit: usize,
    ) -> Result<Vec<(Chunk, String, f32)>, StoreError> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let patterns: Vec<String> = keywords.iter().map(|k| format!("%{k}%")).collect();
        let rows = sqlx::query_as::<_, ChunkRow>(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.content, c.content_length,
                   c.embedding as "embedding: Vector", c.created_at,
                   d.title as document_title,
                   0.7::real as similarity
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE d.processing_status = $1 AND c.content_length > $2
              AND c.content ILIKE ANY($3)
            ORDER BY c.chunk_index
            LIMIT $4
            "#,
        )
        .bind(filter.status.as_str())
        .bind(filter.min_content_length)
        .bind(&patterns)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ChunkRow::into_tuple).collect())
    }
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    id: i64,
    document_id: i64,
    chunk_index: i32,
    content: String,
    content_length: i32,
    embedding: Option<Vector>,
    created_at: chrono::DateTime<chrono::Utc>,
    document_title: String,
    similarity: f32,
}

impl ChunkRow {
    fn into_tuple(self) -> (Chunk, String, f32) {
        let chunk = Chunk {
            id: self.id,
            document_id: self.document_id,
            chunk_index: self.chunk_index,
            content: self.content,
            content_length: self.content_length,
            embedding: self.embedding.map(|v| v.to_vec()),
            created_at: self.created_at,
        };
        (chunk, self.document_title, self.similarity)
    }
}
