//! Error types for the note store
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized for a UI bridge.
//!
//! A skipped duplicate save is not an error; see `SaveOutcome::Skipped`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Table or column creation failed. Fatal: the store must not be used.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A single statement failed (constraint violation, bad SQL, engine I/O).
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    /// Wrong key or corrupted ciphertext/IV for one field.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Note not found: {0}")]
    NoteNotFound(i64),

    #[error("Tag not found: {0}")]
    TagNotFound(String),

    #[error("Invalid reminder: {0}")]
    InvalidReminder(String),
}

impl AppError {
    /// True when the failure is a UNIQUE constraint violation, e.g. a tag
    /// name that already exists.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Query(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
