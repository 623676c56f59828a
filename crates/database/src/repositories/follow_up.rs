use crate::pool::DbPool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use services::actions::models::{FollowUp, FollowUpUnit, NewFollowUp};
use services::actions::ports::FollowUpRepository;
use tracing::debug;
use uuid::Uuid;

pub struct PgFollowUpRepository {
    pool: DbPool,
}

impl PgFollowUpRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_follow_up(&self, row: tokio_postgres::Row) -> Result<FollowUp> {
        let unit: String = row.try_get("unit")?;
        Ok(FollowUp {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            duration: row.try_get("duration")?,
            unit: unit.parse::<FollowUpUnit>().map_err(|e| anyhow::anyhow!(e))?,
            details: row.try_get("details")?,
            scheduled_for: row.try_get("scheduled_for")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl FollowUpRepository for PgFollowUpRepository {
    async fn create(&self, new_follow_up: NewFollowUp) -> Result<FollowUp> {
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
                INSERT INTO follow_ups
                    (id, conversation_id, duration, unit, details, scheduled_for,
                     status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, 'scheduled', $7, $7)
                RETURNING *
                "#,
                &[
                    &id,
                    &new_follow_up.conversation_id,
                    &new_follow_up.duration,
                    &new_follow_up.unit.to_string(),
                    &new_follow_up.details,
                    &new_follow_up.scheduled_for,
                    &now,
                ],
            )
            .await
            .context("Failed to create follow-up")?;

        debug!(
            "Created follow-up {} in conversation {}",
            id, new_follow_up.conversation_id
        );
        self.row_to_follow_up(row)
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<FollowUp>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let rows = client
            .query(
                "SELECT * FROM follow_ups WHERE conversation_id = $1 ORDER BY created_at ASC",
                &[&conversation_id],
            )
            .await
            .context("Failed to list follow-ups")?;

        rows.into_iter()
            .map(|row| self.row_to_follow_up(row))
            .collect()
    }
}
