//! Chronolog Error Types

use thiserror::Error;

/// Result type alias for chronolog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Chronolog error types
#[derive(Error, Debug)]
pub enum Error {
    /// Benign terminator: the reader has delivered every entry in the log.
    #[error("end of log reached")]
    EndOfLog,

    /// Another writer holds the lock on the log directory.
    #[error("log is already locked for writing")]
    Locked,

    /// Caller misuse: non-monotone forced time, removing the last remaining
    /// segment, oversized payload, or invalid options.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// End-of-file in the middle of an entry frame. Distinct from
    /// [`Error::EndOfLog`], which is only returned at a frame boundary.
    #[error("truncated entry: unexpected end of file while reading {0}")]
    Truncated(&'static str),

    /// A timestamp or segment filename could not be decoded.
    #[error("invalid encoding: {0}")]
    Format(String),

    /// Serialization error from the codec layer
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is the end-of-log sentinel
    pub fn is_end_of_log(&self) -> bool {
        matches!(self, Error::EndOfLog)
    }
}
