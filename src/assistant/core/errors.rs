//! Error types for the assistant subsystem.

use thiserror::Error;

/// Assistant subsystem error type.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The operator message was empty after sanitization.
    #[error("Empty message")]
    EmptyMessage,
    /// A stored record could not be decoded.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// HTTP client error.
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for assistant operations.
pub type AssistantResult<T> = Result<T, AssistantError>;
