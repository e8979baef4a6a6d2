//! Error types for the scalable Bloom filter

use thiserror::Error;

/// Errors that can occur while building, growing or querying a scalable filter
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Invalid filter parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid error probability: {probability} (must be in (0, 1))")]
    InvalidProbability { probability: f64 },

    #[error("Invalid {name}: {value}")]
    InvalidFactor { name: &'static str, value: f64 },

    #[error("Unsupported schema version: {0} (expected 1 or 2)")]
    InvalidSchemaVersion(u8),

    #[error("Keyed store error: {0}")]
    Store(#[from] StoreError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Errors from keyed storage used by remote tier backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Corrupt value under key {key}: {message}")]
    Corrupt { key: String, message: String },
}

/// Errors from snapshot encoding, decoding and transport
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Unrecognized snapshot layout: {0}")]
    DataFormat(String),

    #[error("Unsupported snapshot version: {version}")]
    UnsupportedVersion { version: u8 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Blob transport error for {path}: {message}")]
    Transport { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from namespace locking
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to create lock file: {0}")]
    CreateFailed(std::io::Error),

    #[error("Namespace {namespace} already locked (holder pid: {pid:?})")]
    AlreadyLocked { namespace: String, pid: Option<u32> },

    #[error("Failed to write PID to lock file: {0}")]
    WriteFailed(std::io::Error),
}
