use anyhow::Result;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

mod config;
mod database;
mod handlers;
mod models;
mod services;
mod state;
mod utils;

use config::Settings;
use database::{DbPool, Repository};
use services::{EmbeddingService, LlmService, MemoryStore, RetrievalService, SessionOrchestrator};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,rag_chat_gateway=debug".to_string()),
        )
        .with_target(true)
        .json()
        .init();

    info!("Starting RAG chat gateway...");

    // Load configuration
    let settings = Settings::load()?;
    info!("Configuration loaded");

    // Initialize database pool
    let db_pool = DbPool::new(&settings.database).await?;
    info!("Database connection established");

    let repository = Arc::new(Repository::new(
        db_pool,
        settings.rag.documents_table.clone(),
        settings.rag.memory_table.clone(),
    ));

    // Initialize collaborator adapters
    let embedding_service = Arc::new(EmbeddingService::new(&settings.llm, &settings.embedding));
    let llm_service = Arc::new(LlmService::new(settings.llm.clone()));
    let retrieval_service = Arc::new(RetrievalService::new(
        repository.clone(),
        embedding_service.clone(),
    ));

    let memory = Arc::new(MemoryStore::new(repository.clone(), llm_service.clone()));

    let orchestrator = Arc::new(SessionOrchestrator::new(
        retrieval_service,
        llm_service,
        memory.clone(),
        settings.rag.retrieval_top_k,
        settings.prompts.persona.clone(),
    ));

    let app_state = AppState {
        orchestrator,
        memory,
        repository,
    };

    let app = build_router(app_state);

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(handlers::ws::ws_handler))
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .with_state(state)
        .layer(
            CorsLayer::permissive()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
}
