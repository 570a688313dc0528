use thiserror::Error;
use uuid::Uuid;

pub type CrmResult<T> = Result<T, CrmError>;

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("Workflow {0} not found")]
    WorkflowNotFound(Uuid),

    // Executions are created by the trigger service before the engine runs;
    // the engine only resolves and completes them.
    #[error("Execution record not found")]
    ExecutionNotFound,

    #[error("Test {0} not found")]
    TestNotFound(Uuid),

    #[error("Test result {0} not found")]
    ResultNotFound(Uuid),

    #[error("Lead {0} not found")]
    LeadNotFound(Uuid),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Action failed: {0}")]
    Action(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
