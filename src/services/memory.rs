use crate::database::Repository;
use crate::models::ChatMessage;
use crate::services::llm::GenerationProvider;
use crate::utils::error::GatewayError;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Storage seam for the memory store, so tests can run without a database.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SummaryRepository: Send + Sync {
    async fn load_summary(&self, client_id: Uuid) -> anyhow::Result<Option<String>>;
    async fn upsert_summary(&self, client_id: Uuid, summary: &str) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
impl SummaryRepository for Repository {
    async fn load_summary(&self, client_id: Uuid) -> anyhow::Result<Option<String>> {
        Repository::load_summary(self, client_id).await
    }

    async fn upsert_summary(&self, client_id: Uuid, summary: &str) -> anyhow::Result<()> {
        Repository::upsert_summary(self, client_id, summary).await
    }
}

/// Memory seam used by the orchestrator.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SummaryMemory: Send + Sync {
    async fn load_summary(&self, client_id: Uuid) -> Result<String, GatewayError>;
    async fn save_exchange(
        &self,
        client_id: Uuid,
        question: &str,
        answer: &str,
    ) -> Result<(), GatewayError>;
    fn release(&self, client_id: Uuid);
}

/// In-memory summarization state for one client. Mutated only under the
/// per-client lock in `save_exchange`.
#[derive(Default)]
struct SummarySession {
    summary: String,
}

/// Per-client conversation memory: a registry of summarization sessions plus
/// the durable summary upsert. Saves for different clients run in parallel;
/// saves for the same client serialize on the session lock.
pub struct MemoryStore {
    repository: Arc<dyn SummaryRepository>,
    generation: Arc<dyn GenerationProvider>,
    sessions: DashMap<Uuid, Arc<Mutex<SummarySession>>>,
}

impl MemoryStore {
    pub fn new(repository: Arc<dyn SummaryRepository>, generation: Arc<dyn GenerationProvider>) -> Self {
        Self {
            repository,
            generation,
            sessions: DashMap::new(),
        }
    }

    fn session_for(&self, client_id: Uuid) -> Arc<Mutex<SummarySession>> {
        self.sessions
            .entry(client_id)
            .or_insert_with(|| Arc::new(Mutex::new(SummarySession::default())))
            .clone()
    }

    fn summarizer_messages(prior: &str, question: &str, answer: &str) -> Vec<ChatMessage> {
        let system = "Progressively summarize the lines of conversation provided, \
                      adding onto the previous summary and returning a new summary."
            .to_string();
        let user = format!(
            "Current summary:\n{}\n\nNew lines of conversation:\nHuman: {}\nAI: {}\n\nNew summary:",
            prior, question, answer
        );
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }
}

#[async_trait::async_trait]
impl SummaryMemory for MemoryStore {
    /// Empty string for ids never seen before; fails only when the store
    /// itself is unavailable.
    async fn load_summary(&self, client_id: Uuid) -> Result<String, GatewayError> {
        let summary = self
            .repository
            .load_summary(client_id)
            .await
            .map_err(|e| GatewayError::Storage(e.to_string()))?;

        Ok(summary.unwrap_or_default())
    }

    async fn save_exchange(
        &self,
        client_id: Uuid,
        question: &str,
        answer: &str,
    ) -> Result<(), GatewayError> {
        let session = self.session_for(client_id);

        // Summarization state is not safe for concurrent mutation; hold the
        // per-client lock across the condense + upsert.
        let mut guard = session.lock().await;

        let messages = Self::summarizer_messages(&guard.summary, question, answer);
        let updated = self.generation.generate(messages).await?;

        self.repository
            .upsert_summary(client_id, &updated)
            .await
            .map_err(|e| GatewayError::Storage(e.to_string()))?;

        guard.summary = updated;
        debug!("Saved exchange for client {}", client_id);
        Ok(())
    }

    /// Drop the in-memory session handle on disconnect. The durable row is
    /// left untouched.
    fn release(&self, client_id: Uuid) {
        if self.sessions.remove(&client_id).is_some() {
            debug!("Released summarization session for client {}", client_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::GenerationStream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Summarizer fake: appends a marker per call and records how many calls
    /// overlap, so tests can assert per-client serialization.
    struct CountingSummarizer {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl CountingSummarizer {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl GenerationProvider for CountingSummarizer {
        async fn generate_stream(
            &self,
            _messages: Vec<ChatMessage>,
        ) -> Result<GenerationStream, GatewayError> {
            Err(GatewayError::Generation("streaming unused in summarizer".into()))
        }

        async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String, GatewayError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let prior = messages
                .iter()
                .find(|m| m.role == "user")
                .map(|m| m.content.clone())
                .unwrap_or_default();
            let updates = prior.matches("+u").count();
            Ok(format!("summary{}", "+u".repeat(updates + 1)))
        }
    }

    /// In-memory store recording every upsert.
    struct RecordingRepository {
        rows: DashMap<Uuid, String>,
    }

    #[async_trait::async_trait]
    impl SummaryRepository for RecordingRepository {
        async fn load_summary(&self, client_id: Uuid) -> anyhow::Result<Option<String>> {
            Ok(self.rows.get(&client_id).map(|r| r.clone()))
        }

        async fn upsert_summary(&self, client_id: Uuid, summary: &str) -> anyhow::Result<()> {
            self.rows.insert(client_id, summary.to_string());
            Ok(())
        }
    }

    fn store() -> (Arc<MemoryStore>, Arc<RecordingRepository>, Arc<CountingSummarizer>) {
        let repository = Arc::new(RecordingRepository { rows: DashMap::new() });
        let summarizer = Arc::new(CountingSummarizer::new());
        let store = Arc::new(MemoryStore::new(repository.clone(), summarizer.clone()));
        (store, repository, summarizer)
    }

    #[tokio::test]
    async fn unknown_client_loads_empty_summary() {
        let (store, _, _) = store();
        let summary = store.load_summary(Uuid::new_v4()).await.unwrap();
        assert_eq!(summary, "");
    }

    #[tokio::test]
    async fn save_then_load_returns_updated_summary() {
        let (store, repository, _) = store();
        let client_id = Uuid::new_v4();

        store.save_exchange(client_id, "q1", "a1").await.unwrap();

        let loaded = store.load_summary(client_id).await.unwrap();
        assert!(!loaded.is_empty());
        assert_eq!(repository.rows.get(&client_id).unwrap().clone(), loaded);
    }

    #[tokio::test]
    async fn save_overwrites_prior_summary_wholesale() {
        let (store, repository, _) = store();
        let client_id = Uuid::new_v4();

        store.save_exchange(client_id, "q1", "a1").await.unwrap();
        store.save_exchange(client_id, "q2", "a2").await.unwrap();

        assert_eq!(repository.rows.len(), 1);
        assert_eq!(repository.rows.get(&client_id).unwrap().clone(), "summary+u+u");
    }

    #[tokio::test]
    async fn concurrent_saves_for_same_client_serialize() {
        let (store, repository, summarizer) = store();
        let client_id = Uuid::new_v4();

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.save_exchange(client_id, "q1", "a1").await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.save_exchange(client_id, "q2", "a2").await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // Both updates applied in some serial order, never interleaved.
        assert_eq!(summarizer.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(repository.rows.get(&client_id).unwrap().clone(), "summary+u+u");
    }

    #[tokio::test]
    async fn concurrent_saves_for_different_clients_run_in_parallel() {
        let (store, _, summarizer) = store();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let client_id = Uuid::new_v4();
            handles.push(tokio::spawn(async move {
                store.save_exchange(client_id, "q", "a").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(summarizer.max_in_flight.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn release_drops_the_in_memory_session() {
        let (store, _, _) = store();
        let client_id = Uuid::new_v4();

        store.save_exchange(client_id, "q", "a").await.unwrap();
        assert!(store.sessions.contains_key(&client_id));

        store.release(client_id);
        assert!(!store.sessions.contains_key(&client_id));
    }
}
