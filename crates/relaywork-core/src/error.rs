use thiserror::Error;

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Error taxonomy surfaced by every workflow operation. The gateway maps
/// these onto HTTP statuses; nothing is retried automatically.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("no authenticated session")]
    Unauthorized,

    #[error("actor is not permitted to perform this operation")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("operation is not valid while the contract is {0}")]
    InvalidState(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0} signature is already recorded")]
    AlreadySigned(&'static str),
}

impl WorkflowError {
    pub fn invalid_state(current: impl Into<String>) -> Self {
        WorkflowError::InvalidState(current.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        WorkflowError::Validation(message.into())
    }
}
