use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("url already exists: {0}")]
    Conflict(String),
    #[error("no database connection")]
    NoBackingStore,
    #[error("storage i/o failed: {0}")]
    Io(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("operation not supported by this tier: {0}")]
    Unsupported(&'static str),
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShortenerError {
    #[error("url already shortened: {short_url}")]
    Conflict { short_url: String },
    #[error("short url not found: {0}")]
    NotFound(String),
    #[error("short url was deleted: {0}")]
    Deleted(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid hash: {0}")]
    InvalidHash(String),
    #[error("storage error: {0}")]
    Storage(String),
}
