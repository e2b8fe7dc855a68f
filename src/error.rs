//! Error vocabulary shared by every provider layer.
//!
//! Each operation either fully completes or fails with one of these values;
//! there is no partial-success channel. Decorators and adapters pass errors
//! through unchanged.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FileSystemError {
    #[error("not found")]
    NotFound,
    #[error("file already exists")]
    FileExist,
    #[error("access denied")]
    AccessDenied,
    #[error("not implemented")]
    NotImplemented,
    #[error("general error")]
    GeneralError,
    #[error("cannot delete")]
    CannotDelete,
    #[error("initialization failure")]
    InitFailure,
}

pub type FsResult<T> = Result<T, FileSystemError>;

impl From<std::io::Error> for FileSystemError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => FileSystemError::NotFound,
            ErrorKind::AlreadyExists => FileSystemError::FileExist,
            ErrorKind::PermissionDenied => FileSystemError::AccessDenied,
            ErrorKind::DirectoryNotEmpty => FileSystemError::CannotDelete,
            ErrorKind::Unsupported => FileSystemError::NotImplemented,
            _ => FileSystemError::GeneralError,
        }
    }
}
