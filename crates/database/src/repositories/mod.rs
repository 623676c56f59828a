pub mod conversation;
pub mod follow_up;
pub mod medical_history;
pub mod message;
pub mod note;
pub mod patient;
pub mod prescription;
pub mod summary;
pub mod user;

pub use conversation::PgConversationRepository;
pub use follow_up::PgFollowUpRepository;
pub use medical_history::PgMedicalHistoryRepository;
pub use message::PgMessageRepository;
pub use note::PgNoteRepository;
pub use patient::PgPatientRepository;
pub use prescription::PgPrescriptionRepository;
pub use summary::PgSummaryRepository;
pub use user::PgUserRepository;
