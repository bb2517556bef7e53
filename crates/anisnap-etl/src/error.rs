//! Error types for the ETL pipeline

use std::time::Duration;
use thiserror::Error;

/// Result type alias for ETL operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Result type alias for snapshot store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Coarse classification used to decide how far an error may travel.
///
/// Retry loops and the orchestrator branch on the kind, never on the
/// concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failure, timeout or 5xx; retried with backoff
    Transient,
    /// HTTP 429; retried after the server-provided delay
    RateLimited,
    /// Response body did not match the expected schema
    Parse,
    /// A record violated a value constraint
    Validation,
    /// Store read/write/commit failure
    Persistence,
    /// Unknown job, unsupported endpoint, invalid settings
    Configuration,
}

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream server error: HTTP {status}")]
    ServerStatus { status: u16 },

    #[error("Rate limited by upstream API (retry after {}s)", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Request rejected by upstream API: HTTP {status}")]
    ClientStatus { status: u16 },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Unsupported endpoint: {0}")]
    UnsupportedEndpoint(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EtlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EtlError::Transport(_) | EtlError::ServerStatus { .. } => ErrorKind::Transient,
            EtlError::RateLimited { .. } => ErrorKind::RateLimited,
            // A 4xx other than 429 will not change on retry
            EtlError::ClientStatus { .. } | EtlError::Parse(_) => ErrorKind::Parse,
            EtlError::Validation(_) => ErrorKind::Validation,
            EtlError::Store(_) => ErrorKind::Persistence,
            EtlError::UnknownJob(_) | EtlError::UnsupportedEndpoint(_) | EtlError::Config(_) => {
                ErrorKind::Configuration
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::RateLimited)
    }
}

/// Errors raised by snapshot store implementations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Failure raised by the in-memory store's fault injection
    #[error("Injected failure: {0}")]
    Injected(String),
}
