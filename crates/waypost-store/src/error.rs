use thiserror::Error;
use uuid::Uuid;

use crate::document::DocKey;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An update targeted a document that does not exist.
    #[error("Document not found: {0}")]
    NotFound(DocKey),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Document body could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A value that must be a JSON object was something else.
    #[error("Document {0} is not a JSON object")]
    NotAnObject(String),

    /// A set-style field op hit a field that is not an array.
    #[error("Field '{field}' of {key} is not an array")]
    NotAnArray { key: DocKey, field: String },

    /// The transaction body rejected the documents it read.
    #[error("Transaction aborted: {0}")]
    Aborted(String),

    /// The backend cannot evaluate this query.
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(Uuid),

    #[error("Blob too large: {size} bytes (max {max})")]
    BlobTooLarge { size: usize, max: usize },

    #[error("Empty blob")]
    EmptyBlob,

    /// Background worker failure (panicked blocking task, poisoned lock).
    #[error("Internal store error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
