use thiserror::Error;

use crate::supervisor::AdapterError;

/// Durable store failures. All variants are transient from the supervisor's
/// point of view: the connection options are built programmatically, so a
/// bad database address surfaces as a connect failure that keeps retrying.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("database query failed: {0}")]
    Query(#[source] sqlx::Error),
    #[error("not connected to the database")]
    NotConnected,
}

impl AdapterError for StoreError {}

/// Queue failures. An address that cannot even be parsed is the one
/// unrecoverable case; everything else (DNS lag at container startup
/// included) is retried.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid queue address: {0}")]
    InvalidAddress(#[source] redis::RedisError),
    #[error("queue connection failed: {0}")]
    Connect(#[source] redis::RedisError),
    #[error("queue operation failed: {0}")]
    Io(#[source] redis::RedisError),
    #[error("not connected to the queue")]
    NotConnected,
}

impl AdapterError for QueueError {
    fn is_fatal(&self) -> bool {
        matches!(self, QueueError::InvalidAddress(_))
    }
}

/// Startup configuration rejected. The single error class that is allowed to
/// terminate the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// The ingestion loop's abort reason: adapter acquisition hit an
/// unrecoverable configuration error. The process exits non-zero.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}
