//! Error types for the warden core library.

use thiserror::Error;

/// Top-level error type for all warden operations.
#[derive(Error, Debug)]
pub enum WardenError {
    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization or deserialization failure (permission/flag payloads).
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A protection with the given id was not found in the store.
    #[error("Protection not found: {0}")]
    ProtectionNotFound(crate::types::ProtectionId),

    /// A stored row could not be decoded into a [`Protection`](crate::Protection).
    #[error("Malformed protection row {id}: {reason}")]
    MalformedRow {
        /// Row id of the offending record.
        id: i64,
        /// Why the row could not be decoded.
        reason: String,
    },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, WardenError>;
