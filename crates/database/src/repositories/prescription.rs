use crate::pool::DbPool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use services::actions::models::{NewPrescription, Prescription};
use services::actions::ports::PrescriptionRepository;
use tracing::debug;
use uuid::Uuid;

pub struct PgPrescriptionRepository {
    pool: DbPool,
}

impl PgPrescriptionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_prescription(&self, row: tokio_postgres::Row) -> Result<Prescription> {
        Ok(Prescription {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            medication_name: row.try_get("medication_name")?,
            dosage: row.try_get("dosage")?,
            frequency: row.try_get("frequency")?,
            details: row.try_get("details")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl PrescriptionRepository for PgPrescriptionRepository {
    async fn create(&self, new_prescription: NewPrescription) -> Result<Prescription> {
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
                INSERT INTO prescriptions
                    (id, conversation_id, medication_name, dosage, frequency, details,
                     status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, 'active', $7, $7)
                RETURNING *
                "#,
                &[
                    &id,
                    &new_prescription.conversation_id,
                    &new_prescription.medication_name,
                    &new_prescription.dosage,
                    &new_prescription.frequency,
                    &new_prescription.details,
                    &now,
                ],
            )
            .await
            .context("Failed to create prescription")?;

        debug!(
            "Created prescription {} in conversation {}",
            id, new_prescription.conversation_id
        );
        self.row_to_prescription(row)
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Prescription>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let rows = client
            .query(
                "SELECT * FROM prescriptions WHERE conversation_id = $1 ORDER BY created_at ASC",
                &[&conversation_id],
            )
            .await
            .context("Failed to list prescriptions")?;

        rows.into_iter()
            .map(|row| self.row_to_prescription(row))
            .collect()
    }
}
