mod routes;

use axum::routing::{delete, get, post};
use axum::Router;
use hr_rag_core::{
    AnswerEngine, AppConfig, HashingEmbeddingProvider, IngestionPipeline, LlmClient, PgChunkStore,
    QueryCoordinator, Retriever,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

pub struct AppState {
    pub coordinator: QueryCoordinator,
    pub ingestion: IngestionPipeline,
    pub store: Arc<dyn hr_rag_core::ChunkStore>,
    pub config: Arc<AppConfig>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(AppConfig::load()?);
    tracing::info!(?config, "configuration loaded");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store: Arc<dyn hr_rag_core::ChunkStore> = Arc::new(PgChunkStore::new(pool));
    let embedder: Arc<dyn hr_rag_core::EmbeddingProvider> =
        Arc::new(HashingEmbeddingProvider::new(config.embedding.clone()));
    let llm = Arc::new(LlmClient::new(config.llm.clone())?);

    let retriever = Retriever::new(store.clone(), embedder.clone(), config.retriever.clone());
    let answer_engine = AnswerEngine::new(llm.clone(), config.clone());
    let coordinator = QueryCoordinator::new(retriever, answer_engine, config.clone());
    let ingestion = IngestionPipeline::new(
        store.clone(),
        embedder.clone(),
        config.chunk.clone(),
        config.ingest.clone(),
    );

    let state = Arc::new(AppState {
        coordinator,
        ingestion,
        store,
        config: config.clone(),
    });

    let app = Router::new()
        .route("/ask", post(routes::ask))
        .route("/documents", get(routes::list_documents).post(routes::upload_document))
        .route("/documents/:id", delete(routes::delete_document))
        .route("/documents/:id/ingest", post(routes::ingest_document))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
