//! Protocol-level errors.

use thiserror::Error;

/// Errors surfaced by the wire codec.
///
/// Event parsing itself never fails; only the framing layer can.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Underlying transport error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A line exceeded the protocol's length limit.
    #[error("line too long: {actual} bytes (limit {limit})")]
    LineTooLong { actual: usize, limit: usize },

    /// A received line was not valid UTF-8.
    #[error("invalid utf-8 at byte {byte_pos}")]
    InvalidUtf8 { byte_pos: usize },
}

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
