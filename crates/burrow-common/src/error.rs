//! Error types for Burrow.

use thiserror::Error;

/// Result type alias using BurrowError.
pub type Result<T> = std::result::Result<T, BurrowError>;

/// Errors that can occur in Burrow operations.
#[derive(Debug, Error)]
pub enum BurrowError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Storage errors
    #[error("page not found: {0}")]
    PageNotFound(String),

    #[error("buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    #[error("page full, unable to insert record")]
    PageFull,

    #[error("record size mismatch: expected {expected}, got {actual}")]
    RecordSizeMismatch { expected: usize, actual: usize },

    // Index errors
    #[error("index metadata does not match open parameters: {0}")]
    BadIndexInfo(String),

    #[error("scan operator out of domain")]
    BadOperator,

    #[error("bad scan range: low {low} exceeds high {high}")]
    BadScanRange { low: i32, high: i32 },

    #[error("no scan in progress")]
    ScanNotStarted,

    #[error("scan has no more qualifying entries")]
    ScanComplete,

    #[error("key not found")]
    NoSuchKey,

    #[error("key {0} cannot be stored in the index")]
    KeyOutOfRange(i32),

    #[error("unsupported attribute type: {0}")]
    UnsupportedType(String),

    #[error("file corrupted: {0}")]
    Corrupted(String),
}
