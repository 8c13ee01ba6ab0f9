//! Error types for usergrid-migrate
//!
//! This module defines the error hierarchy used across the pipeline:
//! - Store client errors (the "domain error" raised by a source or target)
//! - Configuration and CLI errors
//! - Worker thread errors
//!
//! Per-item failures never surface as `MigrateError`; the write handler
//! reports them as an [`ItemOutcome`] and the worker moves on.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the migrator
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Store client errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,

    /// Work queue closed while the producer was still publishing
    #[error("Work queue closed unexpectedly")]
    ChannelClosed,

    /// Bounded queue is full and every worker has stopped
    #[error("Work queue is full and no worker is left to drain it ({published} items published)")]
    NoLiveWorkers { published: u64 },
}

/// Errors raised by a source or target store client
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Authentication was rejected or could not be performed
    #[error("Authentication against '{url}' failed: {reason}")]
    AuthFailed { url: String, reason: String },

    /// The request never produced an HTTP response
    #[error("Request to '{url}' failed: {reason}")]
    Transport { url: String, reason: String },

    /// The store answered with a non-success status
    #[error("Store returned HTTP {status} for '{url}': {error}: {description}")]
    Api {
        url: String,
        status: u16,
        error: String,
        description: String,
    },

    /// The response body did not have the expected shape
    #[error("Malformed response from '{url}': {reason}")]
    Malformed { url: String, reason: String },

    /// Org, application or collection does not exist
    #[error("Not found: '{path}'")]
    NotFound { path: String },

    /// The store refused to create the entity
    #[error("Entity '{key}' rejected by '{path}': {reason}")]
    Rejected {
        path: String,
        key: String,
        reason: String,
    },
}

impl StoreError {
    /// Check if this error came from the transport rather than the store itself
    ///
    /// Used for diagnostics only; the pipeline never retries a write.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport { .. } => true,
            StoreError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Endpoint file could not be read
    #[error("Cannot read endpoint config '{path}': {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    /// Endpoint file is not valid JSON of the expected shape
    #[error("Invalid endpoint config '{path}': {reason}")]
    ParseFailed { path: PathBuf, reason: String },

    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Idle polls before stopping must be positive
    #[error("Invalid max empty count {count}: must be at least 1")]
    InvalidMaxEmptyCount { count: u32 },

    /// Queue timeout must be positive
    #[error("Invalid queue timeout {secs}s: must be at least 1 second")]
    InvalidQueueTimeout { secs: u64 },

    /// Queue capacity must be positive when given
    #[error("Invalid queue capacity {capacity}: must be at least 1")]
    InvalidQueueCapacity { capacity: usize },

    /// Page limit must be positive
    #[error("Invalid page limit {limit} in '{path}': must be at least 1")]
    InvalidPageLimit { path: PathBuf, limit: usize },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker thread could not be started
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },
}

/// Result type alias for MigrateError
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of handing one work item to a write handler
#[derive(Debug)]
pub enum ItemOutcome {
    /// The entity was created (or already existed) in the target
    Created { path: String, key: String },

    /// The target rejected the entity; the item is dropped
    Failed { path: String, error: StoreError },
}

impl ItemOutcome {
    /// Returns true if this outcome represents success
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Created { .. })
    }

    /// Returns the target collection path associated with this outcome
    pub fn path(&self) -> &str {
        match self {
            ItemOutcome::Created { path, .. } => path,
            ItemOutcome::Failed { path, .. } => path,
        }
    }
}
