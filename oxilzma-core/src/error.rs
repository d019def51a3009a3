//! Error types for OxiLZMA operations.
//!
//! Every failure the codec can report is a variant of [`LzmaError`]. The
//! error is `Clone` so that streaming readers and writers can remember the
//! first failure and report it again on every later call.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// The main error type for OxiLZMA operations.
#[derive(Debug, Clone, Error)]
pub enum LzmaError {
    /// The compressed data is not valid LZMA or LZMA2.
    #[error("Corrupted input: {message}")]
    CorruptedInput {
        /// Description of the corruption.
        message: String,
    },

    /// A match refers further back than the decoded history.
    #[error("Invalid back-reference distance: {distance} exceeds history size {history_size}")]
    InvalidDistance {
        /// The invalid zero-based distance.
        distance: u64,
        /// Number of valid bytes in the dictionary.
        history_size: u64,
    },

    /// Options supplied by the caller are out of range.
    #[error("Unsupported configuration: {message}")]
    UnsupportedConfig {
        /// Description of the offending option.
        message: String,
    },

    /// The estimated memory usage is above the caller's limit.
    #[error("Memory limit exceeded: need {needed_kib} KiB, limit is {limit_kib} KiB")]
    MemoryLimitExceeded {
        /// Estimated memory usage in KiB.
        needed_kib: u64,
        /// Caller-supplied limit in KiB.
        limit_kib: u64,
    },

    /// The input ended before the stream was complete.
    #[error("Truncated input: {message}")]
    Truncated {
        /// Description of where the input ended.
        message: String,
    },

    /// The stream has already been finished.
    #[error("Stream already finished")]
    Finished,

    /// I/O error from the underlying reader or writer.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),
}

/// Result type alias for OxiLZMA operations.
pub type Result<T> = std::result::Result<T, LzmaError>;

impl LzmaError {
    /// Create a corrupted input error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::CorruptedInput {
            message: message.into(),
        }
    }

    /// Create an invalid distance error.
    pub fn invalid_distance(distance: u64, history_size: u64) -> Self {
        Self::InvalidDistance {
            distance,
            history_size,
        }
    }

    /// Create an unsupported configuration error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedConfig {
            message: message.into(),
        }
    }

    /// Create a memory limit error.
    pub fn memory_limit(needed_kib: u64, limit_kib: u64) -> Self {
        Self::MemoryLimitExceeded {
            needed_kib,
            limit_kib,
        }
    }

    /// Create a truncated input error.
    pub fn truncated(message: impl Into<String>) -> Self {
        Self::Truncated {
            message: message.into(),
        }
    }

    /// Recover an `LzmaError` that travelled through an `io::Error`.
    ///
    /// Errors produced by the `Read`/`Write` implementations carry the typed
    /// error inside; anything else is classified by its kind.
    pub fn from_io(err: io::Error) -> Self {
        if let Some(inner) = err.get_ref().and_then(|e| e.downcast_ref::<LzmaError>()) {
            return inner.clone();
        }
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Self::truncated(err.to_string()),
            _ => Self::Io(Arc::new(err)),
        }
    }

    /// Whether the error means the compressed data is invalid.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptedInput { .. } | Self::InvalidDistance { .. }
        )
    }

    /// Whether the error means the input ended too early.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::CorruptedInput { .. } | Self::InvalidDistance { .. } => {
                io::ErrorKind::InvalidData
            }
            Self::UnsupportedConfig { .. } => io::ErrorKind::InvalidInput,
            Self::MemoryLimitExceeded { .. } => io::ErrorKind::OutOfMemory,
            Self::Truncated { .. } => io::ErrorKind::UnexpectedEof,
            Self::Finished => io::ErrorKind::Other,
            Self::Io(e) => e.kind(),
        }
    }
}

impl From<io::Error> for LzmaError {
    fn from(err: io::Error) -> Self {
        Self::from_io(err)
    }
}

impl From<LzmaError> for io::Error {
    fn from(err: LzmaError) -> Self {
        io::Error::new(err.io_kind(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LzmaError::corrupted("bad control byte 0x05");
        assert!(err.to_string().contains("Corrupted input"));

        let err = LzmaError::invalid_distance(5000, 100);
        assert!(err.to_string().contains("5000"));

        let err = LzmaError::memory_limit(2048, 1024);
        assert!(err.to_string().contains("2048 KiB"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: LzmaError = io_err.into();
        assert!(matches!(err, LzmaError::Io(_)));

        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let err: LzmaError = eof.into();
        assert!(err.is_truncated());
    }

    #[test]
    fn test_round_trip_through_io_error() {
        let original = LzmaError::corrupted("unfinished range coder");
        let io_err: io::Error = original.into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);

        let back = LzmaError::from_io(io_err);
        assert!(back.is_corruption());
        assert!(back.to_string().contains("unfinished range coder"));
    }

    #[test]
    fn test_clone_keeps_io_source() {
        let err = LzmaError::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        let copy = err.clone();
        match copy {
            LzmaError::Io(inner) => assert_eq!(inner.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
