//! Shared domain types, error taxonomy, configuration, and the engine
//! event bus for the LeadFlow automation core.

pub mod config;
pub mod error;
pub mod event_bus;
pub mod types;

pub use config::AppConfig;
pub use error::{CrmError, CrmResult};
