//! In-memory persistence collaborator backed by DashMap.
//!
//! Production: replace with PostgreSQL (sqlx) or similar ACID store.
//! This provides the same API surface for development and testing.

pub mod store;

pub use store::{CrmStore, ExecutionStats};
