pub mod embedding;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod prompt;
pub mod retrieval;

pub use embedding::EmbeddingService;
pub use llm::LlmService;
pub use memory::MemoryStore;
pub use orchestrator::SessionOrchestrator;
pub use retrieval::RetrievalService;
