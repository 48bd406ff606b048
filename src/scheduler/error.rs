use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Job '{0}' already has a pending run")]
    AlreadyPending(String),

    #[error("No handler registered for job '{0}'")]
    NoHandler(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
