use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Durable per-client conversation summary. At most one row per client id;
/// the summary is replaced wholesale on every completed exchange.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ConversationRecord {
    pub client_id: Uuid,
    pub summary: String,
    pub updated_at: DateTime<Utc>,
}

/// One document returned by similarity search, with the source metadata the
/// client sees in the terminal result payload.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub source: String,
    pub page: i32,
}

impl RetrievedDocument {
    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            source: self.source.clone(),
            page: self.page,
        }
    }
}

/// Wire-facing projection of a retrieved document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    pub source: String,
    pub page: i32,
}
