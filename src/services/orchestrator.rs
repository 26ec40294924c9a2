use crate::models::protocol::{
    ProtocolEvent, QuestionMessage, STATUS_FINISHED, STATUS_GENERATING, STATUS_PERSISTING,
    STATUS_PROCESSING, STATUS_RETRIEVING,
};
use crate::services::llm::{GenerationChunk, GenerationProvider};
use crate::services::memory::SummaryMemory;
use crate::services::prompt;
use crate::services::retrieval::RetrievalProvider;
use crate::utils::error::GatewayError;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Drives one question-answer exchange through its fixed stage sequence,
/// emitting a protocol event at every observable transition. All collaborator
/// access goes through the provider seams so the pipeline itself never
/// touches the network or storage directly.
pub struct SessionOrchestrator {
    retrieval: Arc<dyn RetrievalProvider>,
    generation: Arc<dyn GenerationProvider>,
    memory: Arc<dyn SummaryMemory>,
    top_k: usize,
    persona: String,
}

impl SessionOrchestrator {
    pub fn new(
        retrieval: Arc<dyn RetrievalProvider>,
        generation: Arc<dyn GenerationProvider>,
        memory: Arc<dyn SummaryMemory>,
        top_k: usize,
        persona: String,
    ) -> Self {
        Self {
            retrieval,
            generation,
            memory,
            top_k,
            persona,
        }
    }

    /// Entry point per inbound frame. Every failure is classified and
    /// converted into exactly one terminal error event; nothing propagates
    /// to the transport layer.
    pub async fn handle_message(
        &self,
        client_id: Uuid,
        raw: &str,
        events: &mpsc::Sender<ProtocolEvent>,
    ) {
        if let Err(err) = self.run_exchange(client_id, raw, events).await {
            warn!("Exchange failed for client {}: {}", client_id, err);
            emit(events, ProtocolEvent::error(&err)).await;
        }
    }

    async fn run_exchange(
        &self,
        client_id: Uuid,
        raw: &str,
        events: &mpsc::Sender<ProtocolEvent>,
    ) -> Result<(), GatewayError> {
        // Parse is the only validation gate; an empty question is valid.
        let QuestionMessage { question } = serde_json::from_str(raw)
            .map_err(|e| GatewayError::MalformedInput(e.to_string()))?;

        info!("Processing question for client {} ({} chars)", client_id, question.len());
        emit(events, ProtocolEvent::status(STATUS_PROCESSING)).await;

        // Silent stage: prior summary for this client.
        let summary = self.memory.load_summary(client_id).await?;

        emit(events, ProtocolEvent::status(STATUS_RETRIEVING)).await;
        let documents = self.retrieval.search(&question, self.top_k).await?;
        debug!("Retrieved {} documents", documents.len());

        // Silent stage: deterministic prompt assembly, document order
        // preserved, content sanitized before formatting.
        let messages = prompt::build_messages(&summary, &self.persona, &documents, &question);

        emit(events, ProtocolEvent::status(STATUS_GENERATING)).await;
        let mut stream = self.generation.generate_stream(messages).await?;

        let mut answer: Option<String> = None;
        while let Some(chunk) = stream.next().await {
            match chunk? {
                GenerationChunk::Token(token) => {
                    emit(events, ProtocolEvent::token(token)).await;
                }
                GenerationChunk::Complete(text) => {
                    answer = Some(text);
                }
            }
        }
        let answer = answer.ok_or_else(|| {
            GatewayError::Generation("stream ended without a final answer".to_string())
        })?;

        emit(events, ProtocolEvent::status(STATUS_PERSISTING)).await;
        // Persistence is best-effort relative to the user-visible answer:
        // a failed save is logged and the result still goes out.
        if let Err(err) = self.memory.save_exchange(client_id, &question, &answer).await {
            warn!("Failed to persist memory for client {}: {}", client_id, err);
        }

        emit(events, ProtocolEvent::status(STATUS_FINISHED)).await;
        let metadata = documents.iter().map(|d| d.metadata()).collect();
        emit(events, ProtocolEvent::result(answer, metadata)).await;

        info!("Exchange completed for client {}", client_id);
        Ok(())
    }
}

/// Send one event toward the socket writer. A dropped connection closes the
/// channel; later sends are simply discarded.
async fn emit(events: &mpsc::Sender<ProtocolEvent>, event: ProtocolEvent) {
    let _ = events.send(event).await;
}
