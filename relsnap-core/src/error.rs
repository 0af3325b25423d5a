/*!
Error types for the relsnap core engine.
*/

use thiserror::Error;

/// Result type used throughout the relsnap core.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Errors that can occur during backup and restore operations.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tabular encoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Requested format has no registered codec
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Entity name is not registered in the catalog
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// No snapshot file exists for the entity
    #[error("No snapshot file for entity '{entity}' at {path}")]
    NotFound { entity: String, path: String },

    /// Storage adapter errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Relational store errors (constraint violations, type mismatches, ...)
    #[error("Database error: {0}")]
    Database(String),

    /// Encrypting a sensitive field failed
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// A marked-encrypted secret could not be decrypted
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Integrity check failures
    #[error("Integrity check failed for {path}: expected hash {expected}, got {actual}")]
    IntegrityCheckFailed {
        path: String,
        expected: String,
        actual: String,
    },

    /// Invalid snapshot format
    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl SnapshotError {
    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new database error
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Whether a restore run may continue past this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Decryption(_))
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SnapshotError {
    fn from(err: rusqlite::Error) -> Self {
        SnapshotError::Database(err.to_string())
    }
}
