//! ZDBKV - Error Types
//! Defines the error hierarchy shared by the client, iterators and batches.

use std::sync::Arc;

use thiserror::Error;

/// Custom Result type for the adapter.
pub type Result<T> = std::result::Result<T, ZdbError>;

/// How a caller is expected to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The call failed but the program may continue (I/O, format, closed).
    Recoverable,
    /// A contract was broken by the caller; treat as a bug and abort.
    Fatal,
}

/// Error types for the adapter.
///
/// Cloneable so an iterator can keep the error that invalidated it and
/// still hand it back to the caller.
#[derive(Error, Debug, Clone)]
pub enum ZdbError {
    /// I/O errors from the transport.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// The store answered a command with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// A reply did not have the expected shape or types.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Key not found in the store.
    #[error("Key not found")]
    KeyNotFound,

    /// The store has no more keys past the given cursor.
    #[error("No more data")]
    NoMoreData,

    /// An iterator ran past the last key of its domain.
    #[error("end of data")]
    EndOfData,

    /// Operation on a closed batch or iterator.
    #[error("{0} is closed")]
    Closed(&'static str),

    /// Bad input from the caller (nil or empty keys).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A batch write stopped partway; already applied operations are kept.
    #[error("batch write failed; try again")]
    TryAgain,

    /// Positional access on an iterator that is no longer valid.
    #[error("precondition violated: {0}")]
    PreconditionViolated(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ZdbError {
    /// Classify the error for callers that must distinguish misuse from failure.
    pub fn severity(&self) -> Severity {
        match self {
            ZdbError::PreconditionViolated(_) => Severity::Fatal,
            _ => Severity::Recoverable,
        }
    }

    /// Returns true if this is the iterator exhaustion condition.
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, ZdbError::EndOfData)
    }

    /// Returns true if this error reports a closed batch or iterator.
    pub fn is_closed(&self) -> bool {
        matches!(self, ZdbError::Closed(_))
    }
}

impl From<std::io::Error> for ZdbError {
    fn from(err: std::io::Error) -> Self {
        ZdbError::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        let misuse = ZdbError::PreconditionViolated("next on invalid iterator".into());
        assert_eq!(misuse.severity(), Severity::Fatal);
        assert_eq!(ZdbError::EndOfData.severity(), Severity::Recoverable);
        assert_eq!(ZdbError::TryAgain.severity(), Severity::Recoverable);
    }

    #[test]
    fn test_io_conversion_is_cloneable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: ZdbError = io.into();
        let copy = err.clone();
        assert!(matches!(copy, ZdbError::Io(_)));
        assert!(copy.to_string().contains("reset"));
    }

    #[test]
    fn test_messages() {
        assert_eq!(ZdbError::TryAgain.to_string(), "batch write failed; try again");
        assert_eq!(ZdbError::Closed("batch").to_string(), "batch is closed");
        assert!(ZdbError::EndOfData.is_end_of_data());
        assert!(ZdbError::Closed("iterator").is_closed());
    }
}
