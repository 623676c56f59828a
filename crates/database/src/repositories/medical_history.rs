use crate::pool::DbPool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use services::actions::models::MedicalHistory;
use services::actions::ports::MedicalHistoryRepository;
use tracing::debug;
use uuid::Uuid;

pub struct PgMedicalHistoryRepository {
    pool: DbPool,
}

impl PgMedicalHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_history(&self, row: tokio_postgres::Row) -> Result<MedicalHistory> {
        Ok(MedicalHistory {
            conversation_id: row.try_get("conversation_id")?,
            content: row.try_get("content")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl MedicalHistoryRepository for PgMedicalHistoryRepository {
    async fn upsert(&self, conversation_id: Uuid, content: &str) -> Result<MedicalHistory> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let now = Utc::now();

        let row = client
            .query_one(
                r#"
                INSERT INTO medical_histories (conversation_id, content, updated_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (conversation_id)
                DO UPDATE SET content = EXCLUDED.content, updated_at = EXCLUDED.updated_at
                RETURNING *
                "#,
                &[&conversation_id, &content, &now],
            )
            .await
            .context("Failed to upsert medical history")?;

        debug!("Stored medical history for conversation {}", conversation_id);
        self.row_to_history(row)
    }

    async fn get_by_conversation(&self, conversation_id: Uuid) -> Result<Option<MedicalHistory>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_opt(
                "SELECT * FROM medical_histories WHERE conversation_id = $1",
                &[&conversation_id],
            )
            .await
            .context("Failed to query medical history")?;

        match row {
            Some(row) => Ok(Some(self.row_to_history(row)?)),
            None => Ok(None),
        }
    }
}
