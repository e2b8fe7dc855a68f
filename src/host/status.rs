//! Translation from provider errors to the errno-style status codes the
//! driver boundary speaks. Statuses are negative; 0 is success.

use crate::error::FileSystemError;

/// Status returned for an operation naming a handle with no open context.
pub const STATUS_BAD_HANDLE: i32 = -libc::EBADF;

pub fn status_of(err: FileSystemError) -> i32 {
    match err {
        FileSystemError::NotFound => -libc::ENOENT,
        FileSystemError::FileExist => -libc::EEXIST,
        FileSystemError::AccessDenied => -libc::EACCES,
        FileSystemError::NotImplemented => -libc::ENOSYS,
        FileSystemError::CannotDelete => -libc::EBUSY,
        FileSystemError::GeneralError | FileSystemError::InitFailure => -libc::EIO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_maps_to_a_negative_status() {
        let all = [
            FileSystemError::NotFound,
            FileSystemError::FileExist,
            FileSystemError::AccessDenied,
            FileSystemError::NotImplemented,
            FileSystemError::GeneralError,
            FileSystemError::CannotDelete,
            FileSystemError::InitFailure,
        ];
        for err in all {
            assert!(status_of(err) < 0, "{err}");
        }
        assert_eq!(status_of(FileSystemError::NotFound), -libc::ENOENT);
        assert_eq!(status_of(FileSystemError::FileExist), -libc::EEXIST);
        assert_eq!(status_of(FileSystemError::CannotDelete), -libc::EBUSY);
        assert!(STATUS_BAD_HANDLE < 0);
    }
}
