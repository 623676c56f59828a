pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::DbPool;
pub use repositories::{
    PgConversationRepository, PgFollowUpRepository, PgMedicalHistoryRepository,
    PgMessageRepository, PgNoteRepository, PgPatientRepository, PgPrescriptionRepository,
    PgSummaryRepository, PgUserRepository,
};

use anyhow::Result;

/// Database service combining all repositories
pub struct Database {
    pub users: PgUserRepository,
    pub patients: PgPatientRepository,
    pub conversations: PgConversationRepository,
    pub messages: PgMessageRepository,
    pub notes: PgNoteRepository,
    pub follow_ups: PgFollowUpRepository,
    pub prescriptions: PgPrescriptionRepository,
    pub summaries: PgSummaryRepository,
    pub medical_histories: PgMedicalHistoryRepository,
    pool: DbPool,
}

impl Database {
    /// Create a new database service from a connection pool
    pub fn new(pool: DbPool) -> Self {
        Self {
            users: PgUserRepository::new(pool.clone()),
            patients: PgPatientRepository::new(pool.clone()),
            conversations: PgConversationRepository::new(pool.clone()),
            messages: PgMessageRepository::new(pool.clone()),
            notes: PgNoteRepository::new(pool.clone()),
            follow_ups: PgFollowUpRepository::new(pool.clone()),
            prescriptions: PgPrescriptionRepository::new(pool.clone()),
            summaries: PgSummaryRepository::new(pool.clone()),
            medical_histories: PgMedicalHistoryRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new database service from configuration
    pub async fn from_config(config: &config::DatabaseConfig) -> Result<Self> {
        let pool = pool::create_pool(config).await?;
        Ok(Self::new(pool))
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
