//! Error types for Storefront Flux
//!
//! The core pipelines are total: they degrade to defaults and record advisory
//! notes instead of failing. These errors only surface at the boundaries that
//! parse JSON, load configuration or touch storage.

use thiserror::Error;

/// Errors that can occur at the crate's JSON/config boundaries
#[derive(Debug, Error)]
pub enum FluxError {
    #[error("Failed to parse payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Unknown flush trigger: {0}")]
    UnknownTrigger(String),
}

/// Errors raised by an [`EventStore`](crate::behavior::store::EventStore).
///
/// The ledger swallows these; they exist so implementations can report what
/// went wrong to logs.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a [`BatchSink`](crate::behavior::sink::BatchSink).
///
/// Delivery is fire-and-forget; the ledger logs and drops these.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Delivery rejected: {0}")]
    Rejected(String),

    #[error("Failed to encode batch: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Delivery I/O error: {0}")]
    Io(#[from] std::io::Error),
}
