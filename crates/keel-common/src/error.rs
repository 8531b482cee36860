//! Error types for KeelDB.

use thiserror::Error;

/// Result type alias using KeelError.
pub type Result<T> = std::result::Result<T, KeelError>;

/// Errors that can occur in KeelDB operations.
#[derive(Debug, Error)]
pub enum KeelError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("partial I/O: transferred {actual} bytes, expected {expected}")]
    PartialIo { expected: usize, actual: usize },

    // Pager errors
    #[error("operation on a closed pager")]
    PagerClosed,

    #[error("page {page_id} is out of range")]
    PageOutOfRange { page_id: u32 },

    // Index errors
    #[error("page {page_id} checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        page_id: u32,
        stored: u32,
        computed: u32,
    },

    #[error("key not found")]
    KeyNotFound,

    #[error("key already exists")]
    KeyAlreadyExists,

    // Record log errors
    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },
}
