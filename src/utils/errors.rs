//! Custom error types for the backup engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Data store error: {0}")]
    Store(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Unknown backup domain: {0}")]
    UnknownDomain(String),

    #[error("Backup cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, BackupError>;
