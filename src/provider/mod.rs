//! The backend-agnostic provider contract.
//!
//! A provider translates filesystem operations against normalized absolute
//! paths and open-file contexts into backend storage actions. Backends
//! implement the trait directly (see `mirror`), through the whole-object
//! adapter (see `atomicfs`), or by wrapping another provider (see `wrapper`
//! and `logger`).

mod info;

pub use info::{FileAttributes, FileInfo, FileInfoFlags, VolumeInfo, VolumeInfoFlags};

use crate::error::{FileSystemError, FsResult};
use async_trait::async_trait;
use std::any::Any;
use std::collections::BTreeMap;

/// Options carried by `create`/`open`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreationParams {
    pub directory: bool,
    pub readonly: bool,
    pub hidden: bool,
}

impl CreationParams {
    pub fn directory() -> Self {
        CreationParams {
            directory: true,
            ..Default::default()
        }
    }
}

/// Per-open-handle state.
///
/// A context exists between a successful `create`/`open` and the matching
/// `close`, and is owned exclusively by the dispatch call operating on it:
/// the native layer never issues two concurrent operations against the same
/// handle. Multiple contexts may reference the same path concurrently; each
/// carries an independent handle id.
pub struct FileContext {
    /// Normalized path: forward-slash separated, absolute from the volume
    /// root (`/a/b.txt`).
    pub path: String,
    pub is_directory: bool,
    /// Opaque nonzero id assigned by the provider on `create`/`open`;
    /// 0 means "not yet assigned".
    pub handle: u64,
    /// Backend-private state riding along with the open file.
    pub user_context: Option<Box<dyn Any + Send + Sync>>,
}

impl FileContext {
    pub fn new(path: impl Into<String>, is_directory: bool) -> Self {
        FileContext {
            path: path.into(),
            is_directory,
            handle: 0,
            user_context: None,
        }
    }

    /// Borrow the backend-private state, if present and of the expected type.
    pub fn user<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.user_context.as_deref().and_then(|c| c.downcast_ref())
    }
}

impl std::fmt::Debug for FileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContext")
            .field("path", &self.path)
            .field("is_directory", &self.is_directory)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Contract every backend implements.
///
/// All operations signal failure through `FileSystemError`; on failure the
/// caller assumes no side effect occurred unless the operation's contract
/// states otherwise (`delete` with `check_only` never has one by
/// definition). Write-side operations default to `NotImplemented` so
/// read-only backends only implement what they support.
#[async_trait]
pub trait FileSystemProvider: Send + Sync {
    async fn get_volume_info(&self, flags: VolumeInfoFlags) -> FsResult<VolumeInfo>;

    /// Fails with `FileExist` when the path already exists. On success the
    /// provider assigns a nonzero handle into `ctx` and sets
    /// `ctx.is_directory`.
    async fn create(&self, ctx: &mut FileContext, params: &CreationParams) -> FsResult<()>;

    /// Fails with `NotFound` when the path does not exist, without creating
    /// it as a side effect. Otherwise assigns a handle and determines
    /// `ctx.is_directory` from backend metadata.
    async fn open(&self, ctx: &mut FileContext, params: &CreationParams) -> FsResult<()>;

    /// Reads at `offset` into `buf`, never past end-of-file. Returns the
    /// number of bytes placed in `buf`; a short count means end-of-file.
    async fn read(&self, ctx: &FileContext, buf: &mut [u8], offset: u64) -> FsResult<usize>;

    /// Writes `data` at `offset`. With `write_to_eof` the effective offset
    /// is the file's size at the moment of the call; under concurrent
    /// writers that is a point-in-time value, not a transactional append.
    async fn write(
        &self,
        _ctx: &FileContext,
        _data: &[u8],
        _offset: u64,
        _write_to_eof: bool,
    ) -> FsResult<usize> {
        Err(FileSystemError::NotImplemented)
    }

    /// Releases backend resources tied to the handle and resets
    /// `ctx.handle` to 0.
    async fn close(&self, ctx: &mut FileContext) -> FsResult<()>;

    /// With `check_only` set, verifies deletion is currently legal and
    /// performs no deletion (used to validate delete-on-close before
    /// commit).
    async fn delete(&self, _ctx: &FileContext, _check_only: bool) -> FsResult<()> {
        Err(FileSystemError::NotImplemented)
    }

    /// Fails with `FileExist` when the destination exists and
    /// `replace_if_exists` is false. On success updates `ctx.path`.
    async fn rename(
        &self,
        _ctx: &mut FileContext,
        _new_path: &str,
        _replace_if_exists: bool,
    ) -> FsResult<()> {
        Err(FileSystemError::NotImplemented)
    }

    async fn get_file_info(&self, ctx: &FileContext) -> FsResult<FileInfo>;

    /// Applies the subset of `info` selected by `flags`; subsets the
    /// backend does not support fail with `NotImplemented`.
    async fn set_file_info(
        &self,
        _ctx: &FileContext,
        _info: &FileInfo,
        _flags: FileInfoFlags,
    ) -> FsResult<()> {
        Err(FileSystemError::NotImplemented)
    }

    /// Enumerates the directory identified by `ctx`, filtered by a glob
    /// `pattern` (empty or `*` lists everything).
    async fn find_files(
        &self,
        ctx: &FileContext,
        pattern: &str,
    ) -> FsResult<BTreeMap<String, FileInfo>>;
}
