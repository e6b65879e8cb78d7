//! Error types

use std::io;
use thiserror::Error;

/// Result type for stream operations
pub type Result<T> = std::result::Result<T, AtscError>;

/// Errors surfaced while reading or writing streams.
///
/// Decoding failures inside the pipeline are not errors: an uncorrectable
/// packet is passed on with its transport error flag set.
#[derive(Error, Debug)]
pub enum AtscError {
    /// Underlying reader or writer failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport packet without the 0x47 sync byte
    #[error("Invalid sync byte 0x{found:02x} at byte offset {offset}")]
    InvalidSyncByte { offset: u64, found: u8 },

    /// Stream ended in the middle of a record
    #[error("Truncated record: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}
