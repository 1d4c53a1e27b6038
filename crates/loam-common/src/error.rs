//! Error types for LoamDB.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in LoamDB operations.
///
/// Apart from [`Error::KeyTooLarge`] and [`Error::ValueTooLarge`], which are
/// caller mistakes, every variant means the store can no longer guarantee its
/// durability contract and should be abandoned.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data file corrupted: {0}")]
    DataFileCorrupted(String),

    #[error("page {page_num} corrupted: {reason}")]
    PageCorrupted { page_num: i64, reason: String },

    #[error("invalid page type: {0}")]
    InvalidPageType(i16),

    #[error("WAL corrupted at offset {offset}: {reason}")]
    WalCorrupted { offset: u64, reason: String },

    #[error("invalid WAL frame type: {0}")]
    InvalidFrameType(i16),

    #[error("page size mismatch: expected {expected}, got {actual}")]
    PageSizeMismatch { expected: usize, actual: usize },

    #[error("key too large: {len} bytes (max {max})")]
    KeyTooLarge { len: usize, max: usize },

    #[error("value too large: {len} bytes (max {max})")]
    ValueTooLarge { len: usize, max: usize },

    #[error("invalid node capacity: {0}")]
    InvalidCapacity(usize),

    #[error("tree corrupted: {0}")]
    TreeCorrupted(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_page_corrupted_display() {
        let err = Error::PageCorrupted {
            page_num: 42,
            reason: "bad type tag".to_string(),
        };
        assert_eq!(err.to_string(), "page 42 corrupted: bad type tag");
    }

    #[test]
    fn test_wal_corrupted_display() {
        let err = Error::WalCorrupted {
            offset: 4106,
            reason: "unrecognized frame type".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "WAL corrupted at offset 4106: unrecognized frame type"
        );
    }

    #[test]
    fn test_size_errors_display() {
        let err = Error::KeyTooLarge { len: 12, max: 8 };
        assert_eq!(err.to_string(), "key too large: 12 bytes (max 8)");

        let err = Error::ValueTooLarge { len: 9, max: 8 };
        assert_eq!(err.to_string(), "value too large: 9 bytes (max 8)");

        let err = Error::PageSizeMismatch {
            expected: 4096,
            actual: 100,
        };
        assert_eq!(err.to_string(), "page size mismatch: expected 4096, got 100");
    }

    #[test]
    fn test_invalid_type_display() {
        assert_eq!(Error::InvalidPageType(7).to_string(), "invalid page type: 7");
        assert_eq!(
            Error::InvalidFrameType(0).to_string(),
            "invalid WAL frame type: 0"
        );
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(Error::InvalidCapacity(0))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
