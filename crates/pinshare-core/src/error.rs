use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

use locality::LocalityError;
use storage::StorageError;

/// Every way a transfer can fail. A session never retries; the first error
/// aborts it and reaches the caller as one of these.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The peer went away while a field or the declared payload was pending.
    #[error("connection closed unexpectedly while {0}")]
    ConnectionFault(String),
    #[error("PIN authentication failed: {0}")]
    Authentication(String),
    /// Digest mismatch, or the receiver reported one.
    #[error("integrity check failed: {0}")]
    Integrity(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("source not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("no free destination name for {}", .0.display())]
    NameExhausted(PathBuf),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = TransferError> = std::result::Result<T, E>;

impl TransferError {
    /// Map a socket error, treating a vanished peer as a connection fault.
    pub(crate) fn from_io(err: std::io::Error, while_doing: &str) -> Self {
        match err.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => TransferError::ConnectionFault(while_doing.to_string()),
            _ => TransferError::Io(err),
        }
    }
}

impl From<StorageError> for TransferError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NameExhausted(path) => TransferError::NameExhausted(path),
            StorageError::InvalidName(name) => {
                TransferError::Validation(format!("peer sent an unusable file name {name:?}"))
            }
            StorageError::Io(e) => TransferError::Io(e),
        }
    }
}

impl From<LocalityError> for TransferError {
    fn from(err: LocalityError) -> Self {
        TransferError::Validation(err.to_string())
    }
}

impl From<zip::result::ZipError> for TransferError {
    fn from(err: zip::result::ZipError) -> Self {
        TransferError::Archive(err.to_string())
    }
}

impl From<walkdir::Error> for TransferError {
    fn from(err: walkdir::Error) -> Self {
        TransferError::Archive(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_is_connection_fault() {
        let err = TransferError::from_io(ErrorKind::UnexpectedEof.into(), "reading nonce");
        assert!(matches!(err, TransferError::ConnectionFault(ref what) if what == "reading nonce"));

        let err = TransferError::from_io(ErrorKind::PermissionDenied.into(), "writing");
        assert!(matches!(err, TransferError::Io(_)));
    }

    #[test]
    fn test_storage_errors_map_to_kinds() {
        let err: TransferError = StorageError::NameExhausted(PathBuf::from("/tmp/a.txt")).into();
        assert!(matches!(err, TransferError::NameExhausted(_)));
        let err: TransferError = StorageError::InvalidName("..".into()).into();
        assert!(matches!(err, TransferError::Validation(_)));
    }
}
