//! Clinical actions: notes, follow-ups, prescriptions, and their
//! aggregated projection for display and transport

pub mod models;
pub mod ports;
pub mod service;

pub use models::*;
pub use ports::*;
pub use service::ActionService;
