//! Workflow execution — runs ordered action lists against lead records for
//! the LeadFlow CRM, aborting on first failure and completing the execution
//! record exactly once.

pub mod actions;
pub mod dates;
pub mod engine;
pub mod template;

pub use actions::{ActionDispatcher, ActionKind, DispatchOutcome, ExecutionContext};
pub use engine::WorkflowEngine;
