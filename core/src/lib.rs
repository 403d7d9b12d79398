pub mod answer;
pub mod chunker;
pub mod config;
pub mod coordinator;
pub mod domain_rules;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod ingestion;
pub mod llm;
pub mod models;
pub mod retriever;
pub mod store;

pub use answer::AnswerEngine;
pub use config::AppConfig;
pub use coordinator::QueryCoordinator;
pub use embedding::{EmbeddingProvider, HashingEmbeddingProvider};
pub use error::{CoreError, EmbedError, ExtractError, IngestError, LlmError, StoreError};
pub use ingestion::IngestionPipeline;
pub use llm::LlmClient;
pub use models::*;
pub use retriever::Retriever;
pub use store::{ChunkStore, PgChunkStore};
