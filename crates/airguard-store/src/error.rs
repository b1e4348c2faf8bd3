//! Error types for airguard-store.

use std::path::PathBuf;

/// Result type for airguard-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in airguard-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Device not found, or not owned by the account that asked for it.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Another device already uses this name.
    #[error("Device name already in use: {0}")]
    NameTaken(String),
}
