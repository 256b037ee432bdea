//! Error types for local persistence.

use thiserror::Error;

/// Local key-value storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Data corruption detected: {0}")]
    Corruption(String),

    #[error("Failed to encode value for {key}: {message}")]
    Encode { key: String, message: String },

    #[error("Failed to decode value for {key}: {message}")]
    Decode { key: String, message: String },
}

impl StorageError {
    pub fn user_message(&self) -> &'static str {
        match self {
            StorageError::Database(_) => "A data operation failed. Please try again.",
            StorageError::Corruption(_) => {
                "Local data may be corrupted. Consider resetting app data."
            }
            StorageError::Encode { .. } => "Failed to save local data.",
            StorageError::Decode { .. } => "Saved data could not be read and was ignored.",
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("corrupt") => {
                StorageError::Corruption(err.to_string())
            }
            _ => StorageError::Database(err.to_string()),
        }
    }
}
