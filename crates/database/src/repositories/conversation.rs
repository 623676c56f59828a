use crate::pool::DbPool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use services::conversations::models::{Conversation, ConversationStatus};
use services::conversations::ports::ConversationRepository;
use tracing::debug;
use uuid::Uuid;

pub struct PgConversationRepository {
    pool: DbPool,
}

impl PgConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // Helper method to convert database row to Conversation model
    fn row_to_conversation(&self, row: tokio_postgres::Row) -> Result<Conversation> {
        let status: String = row.try_get("status")?;
        Ok(Conversation {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            patient_id: row.try_get("patient_id")?,
            status: status
                .parse::<ConversationStatus>()
                .map_err(|e| anyhow::anyhow!(e))?,
            patient_language: row.try_get("patient_language")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
        })
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn create(
        &self,
        user_id: Uuid,
        patient_id: Uuid,
        patient_language: &str,
    ) -> Result<Conversation> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let id = Uuid::new_v4();
        let now = Utc::now();

        let row = client
            .query_one(
                r#"
                INSERT INTO conversations (id, user_id, patient_id, status, patient_language, start_time)
                VALUES ($1, $2, $3, 'active', $4, $5)
                RETURNING *
                "#,
                &[&id, &user_id, &patient_id, &patient_language, &now],
            )
            .await
            .context("Failed to create conversation")?;

        debug!("Created conversation: {} for user: {}", id, user_id);
        self.row_to_conversation(row)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_opt("SELECT * FROM conversations WHERE id = $1", &[&id])
            .await
            .context("Failed to query conversation")?;

        match row {
            Some(row) => Ok(Some(self.row_to_conversation(row)?)),
            None => Ok(None),
        }
    }

    async fn get_owned(&self, id: Uuid, user_id: Uuid) -> Result<Option<Conversation>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_opt(
                "SELECT * FROM conversations WHERE id = $1 AND user_id = $2",
                &[&id, &user_id],
            )
            .await
            .context("Failed to query conversation")?;

        match row {
            Some(row) => Ok(Some(self.row_to_conversation(row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let rows = client
            .query(
                r#"
                SELECT * FROM conversations
                WHERE user_id = $1
                ORDER BY start_time DESC
                "#,
                &[&user_id],
            )
            .await
            .context("Failed to list conversations")?;

        rows.into_iter()
            .map(|row| self.row_to_conversation(row))
            .collect()
    }

    async fn update_patient_language(&self, id: Uuid, language: &str) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        client
            .execute(
                "UPDATE conversations SET patient_language = $2 WHERE id = $1",
                &[&id, &language],
            )
            .await
            .context("Failed to update patient language")?;

        debug!("Updated patient language for conversation {}: {}", id, language);
        Ok(())
    }

    async fn finalize(
        &self,
        id: Uuid,
        status: ConversationStatus,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Conversation>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_opt(
                r#"
                UPDATE conversations
                SET status = $2, end_time = $3
                WHERE id = $1
                RETURNING *
                "#,
                &[&id, &status.to_string(), &end_time],
            )
            .await
            .context("Failed to finalize conversation")?;

        match row {
            Some(row) => {
                debug!("Finalized conversation {} as {}", id, status);
                Ok(Some(self.row_to_conversation(row)?))
            }
            None => Ok(None),
        }
    }

    async fn finalize_with_summary(
        &self,
        id: Uuid,
        summary: &str,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Conversation>> {
        let mut client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let tx = client
            .transaction()
            .await
            .context("Failed to open transaction")?;

        let row = tx
            .query_opt(
                r#"
                UPDATE conversations
                SET status = 'summarized', end_time = $2
                WHERE id = $1
                RETURNING *
                "#,
                &[&id, &end_time],
            )
            .await
            .context("Failed to mark conversation summarized")?;

        let Some(row) = row else {
            tx.rollback().await.context("Failed to roll back")?;
            return Ok(None);
        };

        tx.execute(
            r#"
            INSERT INTO summaries (conversation_id, content, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (conversation_id)
            DO UPDATE SET content = EXCLUDED.content, created_at = EXCLUDED.created_at
            "#,
            &[&id, &summary, &Utc::now()],
        )
        .await
        .context("Failed to upsert summary")?;

        tx.commit().await.context("Failed to commit summary")?;

        debug!("Summarized conversation {}", id);
        Ok(Some(self.row_to_conversation(row)?))
    }
}
