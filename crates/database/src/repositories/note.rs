use crate::pool::DbPool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use services::actions::models::Note;
use services::actions::ports::NoteRepository;
use tracing::debug;
use uuid::Uuid;

pub struct PgNoteRepository {
    pool: DbPool,
}

impl PgNoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_note(&self, row: tokio_postgres::Row) -> Result<Note> {
        Ok(Note {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            content: row.try_get("content")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn create(&self, conversation_id: Uuid, content: &str) -> Result<Note> {
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
                INSERT INTO notes (id, conversation_id, content, status, created_at, updated_at)
                VALUES ($1, $2, $3, 'active', $4, $4)
                RETURNING *
                "#,
                &[&id, &conversation_id, &content, &now],
            )
            .await
            .context("Failed to create note")?;

        debug!("Created note {} in conversation {}", id, conversation_id);
        self.row_to_note(row)
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Note>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let rows = client
            .query(
                "SELECT * FROM notes WHERE conversation_id = $1 ORDER BY created_at ASC",
                &[&conversation_id],
            )
            .await
            .context("Failed to list notes")?;

        rows.into_iter().map(|row| self.row_to_note(row)).collect()
    }
}
