//! Error taxonomy shared by the store, the inference gateway and the HTTP layer.
//!
//! Model *unavailability* is deliberately absent here: it is a gateway state
//! ([`crate::inference::Readiness::Unavailable`]), not an error.

use thiserror::Error;

/// The persistence layer could not complete a read or write.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned: {0}")]
    Poisoned(String),

    #[error("storage task failed: {0}")]
    Task(String),

    #[error("invalid stored row: {0}")]
    Corrupt(String),
}

/// A loaded model failed while producing text.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model is not loaded")]
    NotReady,

    #[error("generation timed out after {0}s")]
    Timeout(u64),

    #[error("generation failed: {0}")]
    Generation(String),
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Task(err.to_string())
    }
}
