//! Storage error taxonomy, mirroring the teacher's `RepositoryError` pattern
//! (`isolate-core::domain::repository`).

use thiserror::Error;

/// Errors raised by document/job/audit repositories.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested row does not exist.
    #[error("not_found:{0}")]
    NotFound(String),

    /// Input failed validation before it reached the database.
    #[error("invalid_input:{0}")]
    InvalidInput(String),

    /// Underlying database error.
    #[error("storage_error:{0}")]
    Database(#[from] sqlx::Error),

    /// JSON (de)serialization of a stored payload failed.
    #[error("serialization_error:{0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used across the storage crate.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Build a [`StorageError::NotFound`] for the given id.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Build a [`StorageError::InvalidInput`] with the given message.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
