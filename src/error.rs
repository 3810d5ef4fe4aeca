//! Error types for tsmerge
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using TsError
pub type Result<T> = std::result::Result<T, TsError>;

/// Unified error type for tsmerge operations
#[derive(Debug, Error)]
pub enum TsError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("Checksum mismatch: stored {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u64, actual: u64 },

    #[error("WAL record of {size} bytes exceeds the maximum of {max} bytes")]
    OversizedRecord { size: usize, max: usize },

    #[error("Truncated record: {0}")]
    TruncatedRecord(String),

    #[error("Write log node {0} is closed")]
    NodeClosed(String),

    // -------------------------------------------------------------------------
    // Data Errors
    // -------------------------------------------------------------------------
    #[error("Invalid interval [{start}, {end})")]
    InvalidInterval { start: i64, end: i64 },

    #[error("Data corruption: {0}")]
    Corruption(String),

    #[error("Unknown data type: {0}")]
    UnknownDataType(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Engine Errors
    // -------------------------------------------------------------------------
    #[error("Engine is closed")]
    EngineClosed,

    #[error("Background worker {0} panicked")]
    WorkerPanicked(String),

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for TsError {
    fn from(err: bincode::Error) -> Self {
        TsError::Serialization(err.to_string())
    }
}
