use crate::pool::DbPool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use services::conversations::models::{Message, NewMessage, SenderType};
use services::conversations::ports::MessageRepository;
use tracing::debug;
use uuid::Uuid;

pub struct PgMessageRepository {
    pool: DbPool,
}

impl PgMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_message(&self, row: tokio_postgres::Row) -> Result<Message> {
        let sender_type: String = row.try_get("sender_type")?;
        Ok(Message {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            sender_type: sender_type
                .parse::<SenderType>()
                .map_err(|e| anyhow::anyhow!(e))?,
            language: row.try_get("language")?,
            original_text: row.try_get("original_text")?,
            translated_text: row.try_get("translated_text")?,
            original_message_id: row.try_get("original_message_id")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, new_message: NewMessage) -> Result<Message> {
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
                INSERT INTO messages
                    (id, conversation_id, sender_type, language, original_text,
                     translated_text, original_message_id, timestamp)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
                "#,
                &[
                    &id,
                    &new_message.conversation_id,
                    &new_message.sender_type.to_string(),
                    &new_message.language,
                    &new_message.original_text,
                    &new_message.translated_text,
                    &new_message.original_message_id,
                    &now,
                ],
            )
            .await
            .context("Failed to create message")?;

        debug!(
            "Created {} message {} in conversation {}",
            new_message.sender_type, id, new_message.conversation_id
        );
        self.row_to_message(row)
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let rows = client
            .query(
                r#"
                SELECT * FROM messages
                WHERE conversation_id = $1
                ORDER BY timestamp ASC
                "#,
                &[&conversation_id],
            )
            .await
            .context("Failed to list messages")?;

        rows.into_iter().map(|row| self.row_to_message(row)).collect()
    }
}
