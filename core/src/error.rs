use thiserror::Error;

/// Errors raised by the text extractor (C1). Never propagated past the
/// ingestion pipeline — recorded on the `Document` as `failed(error_message)`.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("file is corrupt or unreadable: {0}")]
    CorruptFile(String),
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the embedding provider (C3). `Unavailable` is retriable;
/// callers (ingestion) skip the chunk and continue.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding model unavailable: {0}")]
    Unavailable(String),
    #[error("input exceeds the model's token budget ({0} tokens)")]
    InputTooLong(usize),
}

/// Errors raised by the chunk store (C4).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("document {0} not found")]
    DocumentNotFound(i64),
}

/// Errors raised by the LLM client (C7).
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("request to LLM service timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("LLM service returned an error: {0}")]
    Upstream(String),
}

/// Errors raised by the ingestion pipeline (C5). Every path ends in a
/// terminal `IngestReport`, so this type is used internally to short-circuit
/// the pipeline before that report is built.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("chunking produced no output")]
    NoChunks,
    #[error("no chunks embedded")]
    NoEmbeddings,
    #[error("ingestion deadline exceeded")]
    DeadlineExceeded,
    #[error("document {0} is already being ingested")]
    AlreadyInProgress(i64),
}

/// Top-level error surfaced at the crate boundary (document management,
/// query coordinator) for anything that isn't absorbed into a structured
/// `Answer` or `IngestReport`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InputError(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
