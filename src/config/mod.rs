pub mod settings;

pub use settings::{DatabaseConfig, EmbeddingConfig, LlmConfig, PromptsConfig, RagConfig, ServerConfig, Settings};
