//! Shared Error Types
//!
//! Error types for the four failure classes of the engine and the worker.
//!
//! # Error Categories
//!
//! - `StoreError` - The queue store is unavailable or rejected an operation
//! - `TransportError` - Delivery to `/punch` or `/vacations` did not succeed
//! - `SubmitError` - A user submission could neither be delivered nor queued
//! - `EngineError` - The engine could not be opened
//! - `WorkerError` - The interceptor could not install or serve a request
//!
//! # Recovery
//!
//! None of these are fatal. Storage failures abort only the current
//! submission, transport failures leave actions queued, server rejections
//! are shown verbatim, and worker failures fall back to cached responses.
use thiserror::Error;

/// Queue store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Structured backend failure (quota, corruption, locked database)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Fallback storage file could not be read or written
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored list or payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Delivery failures against the origin
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused, reset, timed out, or response not received
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("Server responded with status {0}")]
    Status(u16),

    /// The server accepted the request but rejected its content
    #[error("Rejected by server: {0}")]
    Rejected(String),
}

/// Submission failures surfaced to the user
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The action could not be delivered and could not be queued either
    #[error("Could not cache this action: {0}")]
    Storage(#[from] StoreError),

    /// The server deliberately rejected the action; it is not queued
    #[error("{0}")]
    Rejected(String),

    /// A required form field was missing
    #[error("Missing form field '{0}'")]
    MissingField(&'static str),
}

/// Engine startup failures
#[derive(Debug, Error)]
pub enum EngineError {
    /// No queue store backend could be opened
    #[error("Queue store unavailable: {0}")]
    Store(#[from] StoreError),

    /// The HTTP client could not be built
    #[error("Transport setup failed: {0}")]
    Transport(#[from] TransportError),
}

/// Network interceptor failures
#[derive(Debug, Error)]
pub enum WorkerError {
    /// An app-shell asset could not be fetched during install
    #[error("Install failed for {asset}: {reason}")]
    Install {
        /// Manifest path that failed
        asset: String,
        /// Human-readable reason
        reason: String,
    },

    /// Neither the network nor the cache could answer
    #[error("No network and no cached response for {0}")]
    Unavailable(String),

    /// Upstream fetch failed
    #[error("Upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    /// The request URL could not be resolved against the origin
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    /// Activation was attempted before a successful install
    #[error("Worker is not installed")]
    NotInstalled,

    /// The worker task is no longer running
    #[error("Worker stopped")]
    Stopped,

    /// The persistent shell cache failed
    #[error("Cache database error: {0}")]
    Cache(#[from] sqlx::Error),

    /// Stored response headers could not be (de)serialized
    #[error("Cache serialization error: {0}")]
    CacheData(#[from] serde_json::Error),

    /// The cache directory could not be created
    #[error("Cache I/O error: {0}")]
    CacheIo(#[from] std::io::Error),

    /// A stored response holds impossible values
    #[error("Corrupt cached response for {0}")]
    CorruptCache(String),

    /// The configured session cookie is not a valid header value
    #[error("Invalid session cookie: {0}")]
    InvalidCookie(#[from] reqwest::header::InvalidHeaderValue),
}
