//! Conversation and message domain types and repository contracts

pub mod models;
pub mod ports;

pub use models::*;
pub use ports::*;
