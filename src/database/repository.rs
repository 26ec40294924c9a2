use super::{ConversationRecord, DbPool, RetrievedDocument};
use anyhow::Result;
use pgvector::Vector;
use tracing::debug;
use uuid::Uuid;

pub struct Repository {
    pool: DbPool,
    documents_table: String,
    memory_table: String,
}

impl Repository {
    pub fn new(pool: DbPool, documents_table: String, memory_table: String) -> Self {
        Self {
            pool,
            documents_table,
            memory_table,
        }
    }

    /// Stored summary for a client, or None for ids never seen before.
    pub async fn load_summary(&self, client_id: Uuid) -> Result<Option<String>> {
        let record = sqlx::query_as::<_, ConversationRecord>(&format!(
            "SELECT client_id, summary, updated_at FROM {} WHERE client_id = $1 LIMIT 1",
            self.memory_table
        ))
        .bind(client_id)
        .persistent(false)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(record.map(|r| r.summary))
    }

    /// Upsert the running summary. Conflict on client_id overwrites the
    /// prior value; rows are created lazily on first save and never deleted.
    pub async fn upsert_summary(&self, client_id: Uuid, summary: &str) -> Result<()> {
        sqlx::query(&format!(
            r#"INSERT INTO {} (client_id, summary, updated_at)
               VALUES ($1, $2, now())
               ON CONFLICT (client_id)
               DO UPDATE SET summary = EXCLUDED.summary, updated_at = now()"#,
            self.memory_table
        ))
        .bind(client_id)
        .bind(summary)
        .persistent(false)
        .execute(self.pool.get_pool())
        .await?;

        debug!("Upserted summary for client {}", client_id);
        Ok(())
    }

    /// Vector search over the documents table, ordered by cosine distance.
    /// Rows with missing source/page metadata degrade to ''/0.
    pub async fn search_documents(
        &self,
        query_embedding: Vector,
        limit: i32,
    ) -> Result<Vec<RetrievedDocument>> {
        let docs = sqlx::query_as::<_, RetrievedDocument>(&format!(
            r#"SELECT
                content,
                COALESCE(metadata->>'source', '') AS source,
                COALESCE((metadata->>'page')::int, 0) AS page
               FROM {}
               ORDER BY embedding <=> $1
               LIMIT $2"#,
            self.documents_table
        ))
        .bind(query_embedding)
        .bind(limit)
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Found {} relevant documents", docs.len());
        Ok(docs)
    }

    /// Cheap liveness query for the readiness probe.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }
}
