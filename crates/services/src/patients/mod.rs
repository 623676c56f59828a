//! Patient domain types and repository contract

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Patient model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    /// Date of birth, normalized to a UTC calendar date
    pub date_of_birth: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PatientRepository: Send + Sync {
    /// Find a patient by name and date of birth, creating one if absent
    async fn find_or_create(
        &self,
        first_name: &str,
        last_name: &str,
        date_of_birth: NaiveDate,
    ) -> Result<Patient>;

    /// Get a patient by ID
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Patient>>;
}
