use crate::database::{Repository, RetrievedDocument};
use crate::services::EmbeddingService;
use crate::utils::error::GatewayError;
use pgvector::Vector;
use std::sync::Arc;
use tracing::debug;

/// Collaborator seam for the orchestrator: given a question, return the
/// most relevant documents in similarity order.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RetrievalProvider: Send + Sync {
    async fn search(&self, question: &str, top_k: usize)
        -> Result<Vec<RetrievedDocument>, GatewayError>;
}

/// Embeds the question and runs a pgvector similarity search. An empty
/// result set is a valid outcome, not a failure.
pub struct RetrievalService {
    repository: Arc<Repository>,
    embedding_service: Arc<EmbeddingService>,
}

impl RetrievalService {
    pub fn new(repository: Arc<Repository>, embedding_service: Arc<EmbeddingService>) -> Self {
        Self {
            repository,
            embedding_service,
        }
    }
}

#[async_trait::async_trait]
impl RetrievalProvider for RetrievalService {
    async fn search(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>, GatewayError> {
        let query_embedding = self.embedding_service.embed(question).await?;

        let docs = self
            .repository
            .search_documents(Vector::from(query_embedding), top_k as i32)
            .await
            .map_err(|e| GatewayError::Retrieval(e.to_string()))?;

        debug!("Retrieved {} documents for question", docs.len());
        Ok(docs)
    }
}
