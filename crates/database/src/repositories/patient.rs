use crate::pool::DbPool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use services::patients::{Patient, PatientRepository};
use tracing::debug;
use uuid::Uuid;

pub struct PgPatientRepository {
    pool: DbPool,
}

impl PgPatientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_patient(&self, row: tokio_postgres::Row) -> Result<Patient> {
        Ok(Patient {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            date_of_birth: row.try_get("date_of_birth")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl PatientRepository for PgPatientRepository {
    async fn find_or_create(
        &self,
        first_name: &str,
        last_name: &str,
        date_of_birth: NaiveDate,
    ) -> Result<Patient> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let id = Uuid::new_v4();
        let now = Utc::now();

        // The no-op update makes the conflicting row come back through
        // RETURNING, so one statement covers both cases.
        let row = client
            .query_one(
                r#"
                INSERT INTO patients (id, first_name, last_name, date_of_birth, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (first_name, last_name, date_of_birth)
                DO UPDATE SET first_name = EXCLUDED.first_name
                RETURNING *
                "#,
                &[&id, &first_name, &last_name, &date_of_birth, &now],
            )
            .await
            .context("Failed to find or create patient")?;

        let patient = self.row_to_patient(row)?;
        debug!("Resolved patient {} ({} {})", patient.id, first_name, last_name);
        Ok(patient)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Patient>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_opt("SELECT * FROM patients WHERE id = $1", &[&id])
            .await
            .context("Failed to query patient")?;

        match row {
            Some(row) => Ok(Some(self.row_to_patient(row)?)),
            None => Ok(None),
        }
    }
}
