use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Connectivity or lock failure; nothing can be done for this report.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Another writer holds the database; worth one retry.
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("corrupt stored row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Faults that must surface to the caller instead of rejecting one report.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Corrupt(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
