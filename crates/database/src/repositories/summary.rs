use crate::pool::DbPool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use services::actions::models::Summary;
use services::actions::ports::SummaryRepository;
use uuid::Uuid;

pub struct PgSummaryRepository {
    pool: DbPool,
}

impl PgSummaryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SummaryRepository for PgSummaryRepository {
    async fn get_by_conversation(&self, conversation_id: Uuid) -> Result<Option<Summary>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_opt(
                "SELECT * FROM summaries WHERE conversation_id = $1",
                &[&conversation_id],
            )
            .await
            .context("Failed to query summary")?;

        Ok(row
            .map(|row| -> Result<Summary> {
                Ok(Summary {
                    conversation_id: row.try_get("conversation_id")?,
                    content: row.try_get("content")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .transpose()?)
    }
}
