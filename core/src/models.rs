use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of a [`Document`], per the lifecycle:
/// pending -> processing -> (completed | failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }
}

/// The file types the extractor dispatches on. `Doc` is recognized only to
/// produce the steering `UnsupportedFormat` error for legacy Word files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    Txt,
    Doc,
}

impl FileKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileKind::Pdf),
            "docx" => Some(FileKind::Docx),
            "txt" => Some(FileKind::Txt),
            "doc" => Some(FileKind::Doc),
            _ => None,
        }
    }
}

/// A source document uploaded by an administrator.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: i64,
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: String,
    pub title: String,
    pub description: Option<String>,
    pub processing_status: DocumentStatus,
    pub chunks_count: Option<i32>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Metadata supplied by the caller at upload time.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub original_filename: String,
    pub file_type: String,
    pub title: String,
    pub description: Option<String>,
}

/// A persisted chunk of a document's text, with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: i32,
    pub content: String,
    pub content_length: i32,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

/// A chunk produced for insertion, before it has been assigned a store id.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i32,
    pub content: String,
    pub content_length: i32,
    pub embedding: Vec<f32>,
}

/// Where a retrieved chunk came from — exposed so downstream components may
/// weight or display it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Vector,
    Text,
    Fallback,
}

/// One candidate surfaced by the retriever, fused and ranked.
#[derive(Debug, Clone, Serialize)]
pub struct RankedChunk {
    pub chunk: Chunk,
    pub document_title: String,
    pub similarity: f32,
    pub search_type: SearchType,
}

/// Filter applied by the chunk store's search operations.
#[derive(Debug, Clone, Copy)]
pub struct SearchFilter {
    pub status: DocumentStatus,
    pub min_content_length: i32,
}

impl Default for SearchFilter {
    fn default() -> Self {
        SearchFilter {
            status: DocumentStatus::Completed,
            min_content_length: 100,
        }
    }
}

/// Outcome of a single `ingest(document_id)` call.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: i64,
    pub status: DocumentStatus,
    pub chunks_created: usize,
    pub error: Option<String>,
}

/// A source citation attached to an [`Answer`].
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub title: String,
    pub chunk_index: i32,
    pub document_id: i64,
}

/// The result of `ask()`, returned to the chat-bot / admin-UI collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Source>,
    pub ok: bool,
    pub tokens_used: u32,
    pub chunks_found: usize,
}

impl Answer {
    pub fn not_found(template: &str) -> Self {
        Answer {
            text: template.to_string(),
            sources: Vec::new(),
            ok: true,
            tokens_used: 0,
            chunks_found: 0,
        }
    }
}
