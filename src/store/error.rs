use thiserror::Error;

use super::RecordId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found: {0}")]
    NotFound(RecordId),
}

pub type StoreResult<T> = Result<T, StoreError>;
