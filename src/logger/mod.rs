//! Audit decorator: forwards every call unchanged in effect, emitting a
//! structured log line around it.
//!
//! Two gates keep high-volume mounts quiet: a bitmask selecting which
//! operation categories to log, and a regular expression matched against
//! the operation's path. Both are fixed at construction. Errors are logged
//! alongside the operation and re-returned unchanged, never swallowed.

use crate::error::{FileSystemError, FsResult};
use crate::provider::{
    CreationParams, FileContext, FileInfo, FileInfoFlags, FileSystemProvider, VolumeInfo,
    VolumeInfoFlags,
};
use async_trait::async_trait;
use bitflags::bitflags;
use regex::Regex;
use std::collections::BTreeMap;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LogFlags: u32 {
        const VOLUME_INFO = 1 << 0;
        const CREATE = 1 << 1;
        const OPEN = 1 << 2;
        const READ = 1 << 3;
        const WRITE = 1 << 4;
        const CLOSE = 1 << 5;
        const CAN_DELETE = 1 << 6;
        const DELETE = 1 << 7;
        const RENAME = 1 << 8;
        const GET_INFO = 1 << 9;
        const SET_INFO = 1 << 10;
        const LIST = 1 << 11;
        /// Log the result value after the call returns.
        const RETURNS = 1 << 16;
        /// Log the error when the call fails.
        const ERRORS = 1 << 17;

        const ALL_OPS = Self::VOLUME_INFO.bits()
            | Self::CREATE.bits()
            | Self::OPEN.bits()
            | Self::READ.bits()
            | Self::WRITE.bits()
            | Self::CLOSE.bits()
            | Self::CAN_DELETE.bits()
            | Self::DELETE.bits()
            | Self::RENAME.bits()
            | Self::GET_INFO.bits()
            | Self::SET_INFO.bits()
            | Self::LIST.bits();
    }
}

pub struct FileSystemLogger<P> {
    inner: P,
    flags: LogFlags,
    filter: Regex,
}

impl<P: FileSystemProvider> FileSystemLogger<P> {
    /// `pattern` is matched against each operation's path; an invalid
    /// expression fails construction.
    pub fn new(inner: P, flags: LogFlags, pattern: &str) -> FsResult<Self> {
        let filter = Regex::new(pattern).map_err(|_| FileSystemError::InitFailure)?;
        Ok(FileSystemLogger {
            inner,
            flags,
            filter,
        })
    }

    fn enabled(&self, flag: LogFlags, path: &str) -> bool {
        self.flags.contains(flag) && self.filter.is_match(path)
    }

    fn finish<T>(&self, desc: &str, result: FsResult<T>, show: impl Fn(&T) -> String) -> FsResult<T> {
        match &result {
            Ok(value) => {
                if self.flags.contains(LogFlags::RETURNS) {
                    info!("{desc} -> {}", show(value));
                }
            }
            Err(err) => {
                if self.flags.contains(LogFlags::ERRORS) {
                    error!("{desc} -> {err}");
                }
            }
        }
        result
    }
}

#[async_trait]
impl<P: FileSystemProvider> FileSystemProvider for FileSystemLogger<P> {
    /// Volume queries carry no path, so only the flag bit gates them.
    async fn get_volume_info(&self, flags: VolumeInfoFlags) -> FsResult<VolumeInfo> {
        if !self.flags.contains(LogFlags::VOLUME_INFO) {
            return self.inner.get_volume_info(flags).await;
        }
        let desc = format!("GetVolumeInfo({flags:?})");
        info!("{desc}");
        let result = self.inner.get_volume_info(flags).await;
        self.finish(&desc, result, |info| {
            format!("{}:{} {}/{}", info.volume_name, info.filesystem_name, info.free_size, info.total_size)
        })
    }

    async fn create(&self, ctx: &mut FileContext, params: &CreationParams) -> FsResult<()> {
        if !self.enabled(LogFlags::CREATE, &ctx.path) {
            return self.inner.create(ctx, params).await;
        }
        let desc = format!(
            "Create({},{})",
            ctx.path,
            if params.directory { "DIR" } else { "FILE" }
        );
        info!("{desc}");
        let result = self.inner.create(ctx, params).await;
        let handle = ctx.handle;
        self.finish(&desc, result, |_| format!("handle {handle}"))
    }

    async fn open(&self, ctx: &mut FileContext, params: &CreationParams) -> FsResult<()> {
        if !self.enabled(LogFlags::OPEN, &ctx.path) {
            return self.inner.open(ctx, params).await;
        }
        let desc = format!("Open({})", ctx.path);
        info!("{desc}");
        let result = self.inner.open(ctx, params).await;
        let handle = ctx.handle;
        self.finish(&desc, result, |_| format!("handle {handle}"))
    }

    async fn read(&self, ctx: &FileContext, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        if !self.enabled(LogFlags::READ, &ctx.path) {
            return self.inner.read(ctx, buf, offset).await;
        }
        let desc = format!("Read({}:{},{:#x},{:#x})", ctx.handle, ctx.path, offset, buf.len());
        info!("{desc}");
        let result = self.inner.read(ctx, buf, offset).await;
        self.finish(&desc, result, |n| n.to_string())
    }

    async fn write(
        &self,
        ctx: &FileContext,
        data: &[u8],
        offset: u64,
        write_to_eof: bool,
    ) -> FsResult<usize> {
        if !self.enabled(LogFlags::WRITE, &ctx.path) {
            return self.inner.write(ctx, data, offset, write_to_eof).await;
        }
        let desc = format!(
            "Write({}:{},{:#x},{:#x},{})",
            ctx.handle,
            ctx.path,
            offset,
            data.len(),
            write_to_eof
        );
        info!("{desc}");
        let result = self.inner.write(ctx, data, offset, write_to_eof).await;
        self.finish(&desc, result, |n| n.to_string())
    }

    async fn close(&self, ctx: &mut FileContext) -> FsResult<()> {
        if !self.enabled(LogFlags::CLOSE, &ctx.path) {
            return self.inner.close(ctx).await;
        }
        let desc = format!("Close({}:{})", ctx.handle, ctx.path);
        info!("{desc}");
        let result = self.inner.close(ctx).await;
        self.finish(&desc, result, |_| String::new())
    }

    async fn delete(&self, ctx: &FileContext, check_only: bool) -> FsResult<()> {
        let flag = if check_only { LogFlags::CAN_DELETE } else { LogFlags::DELETE };
        if !self.enabled(flag, &ctx.path) {
            return self.inner.delete(ctx, check_only).await;
        }
        let desc = format!(
            "{}({}:{})",
            if check_only { "CanDelete" } else { "Delete" },
            ctx.handle,
            ctx.path
        );
        info!("{desc}");
        let result = self.inner.delete(ctx, check_only).await;
        self.finish(&desc, result, |_| String::new())
    }

    async fn rename(
        &self,
        ctx: &mut FileContext,
        new_path: &str,
        replace_if_exists: bool,
    ) -> FsResult<()> {
        if !self.enabled(LogFlags::RENAME, &ctx.path) {
            return self.inner.rename(ctx, new_path, replace_if_exists).await;
        }
        let desc = format!(
            "Rename({}:{},{},{})",
            ctx.handle, ctx.path, new_path, replace_if_exists
        );
        info!("{desc}");
        let result = self.inner.rename(ctx, new_path, replace_if_exists).await;
        self.finish(&desc, result, |_| String::new())
    }

    async fn get_file_info(&self, ctx: &FileContext) -> FsResult<FileInfo> {
        if !self.enabled(LogFlags::GET_INFO, &ctx.path) {
            return self.inner.get_file_info(ctx).await;
        }
        let desc = format!("GetFileInfo({}:{})", ctx.handle, ctx.path);
        info!("{desc}");
        let result = self.inner.get_file_info(ctx).await;
        self.finish(&desc, result, |info| {
            format!(
                "({:?},{},{})",
                info.attributes,
                if info.is_directory() { "DIR" } else { "FILE" },
                info.size
            )
        })
    }

    async fn set_file_info(
        &self,
        ctx: &FileContext,
        info: &FileInfo,
        flags: FileInfoFlags,
    ) -> FsResult<()> {
        if !self.enabled(LogFlags::SET_INFO, &ctx.path) {
            return self.inner.set_file_info(ctx, info, flags).await;
        }
        let desc = format!("SetFileInfo({}:{},{flags:?})", ctx.handle, ctx.path);
        info!("{desc}");
        let result = self.inner.set_file_info(ctx, info, flags).await;
        self.finish(&desc, result, |_| String::new())
    }

    async fn find_files(
        &self,
        ctx: &FileContext,
        pattern: &str,
    ) -> FsResult<BTreeMap<String, FileInfo>> {
        if !self.enabled(LogFlags::LIST, &ctx.path) {
            return self.inner.find_files(ctx, pattern).await;
        }
        let desc = format!("FindFiles({}:{},{pattern})", ctx.handle, ctx.path);
        info!("{desc}");
        let result = self.inner.find_files(ctx, pattern).await;
        self.finish(&desc, result, |entries| format!("{} entries", entries.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomicfs::AtomicFileSystem;
    use crate::memory::MemoryFileSystem;

    fn logged(pattern: &str) -> FileSystemLogger<AtomicFileSystem<MemoryFileSystem>> {
        FileSystemLogger::new(
            AtomicFileSystem::new(MemoryFileSystem::new()),
            LogFlags::all(),
            pattern,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn invalid_filter_fails_construction() {
        let result = FileSystemLogger::new(
            AtomicFileSystem::new(MemoryFileSystem::new()),
            LogFlags::all(),
            "(unclosed",
        );
        assert!(matches!(result, Err(FileSystemError::InitFailure)));
    }

    /// A logger with a never-matching filter must behave exactly like the
    /// inner provider for every operation, results and errors alike.
    #[tokio::test]
    async fn non_matching_filter_is_transparent() {
        let plain = AtomicFileSystem::new(MemoryFileSystem::new());
        let logged = logged("^never-matches$");

        for fs in [&logged as &dyn FileSystemProvider, &plain] {
            let mut ctx = FileContext::new("/a.txt", false);
            fs.create(&mut ctx, &CreationParams::default()).await.unwrap();
            assert_eq!(ctx.handle, 1);
            assert_eq!(fs.write(&ctx, b"hello", 0, false).await, Ok(5));

            let mut buf = [0u8; 8];
            assert_eq!(fs.read(&ctx, &mut buf, 0).await, Ok(5));
            assert_eq!(&buf[..5], b"hello");

            assert_eq!(fs.get_file_info(&ctx).await.unwrap().size, 5);
            assert_eq!(
                fs.set_file_info(&ctx, &FileInfo::default(), FileInfoFlags::TIMES)
                    .await,
                Err(FileSystemError::NotImplemented)
            );
            assert_eq!(fs.delete(&ctx, true).await, Ok(()));

            let mut blocker = FileContext::new("/b.txt", false);
            fs.create(&mut blocker, &CreationParams::default()).await.unwrap();
            assert_eq!(
                fs.rename(&mut ctx, "/b.txt", false).await,
                Err(FileSystemError::FileExist)
            );
            assert_eq!(ctx.path, "/a.txt");
            fs.rename(&mut ctx, "/b.txt", true).await.unwrap();
            assert_eq!(ctx.path, "/b.txt");

            let mut root = FileContext::new("/", true);
            fs.open(&mut root, &CreationParams::directory()).await.unwrap();
            let entries = fs.find_files(&root, "*.txt").await.unwrap();
            assert_eq!(
                entries.keys().cloned().collect::<Vec<_>>(),
                vec!["b.txt".to_string()]
            );
            fs.close(&mut root).await.unwrap();
            fs.close(&mut blocker).await.unwrap();
            fs.close(&mut ctx).await.unwrap();

            let mut missing = FileContext::new("/missing", false);
            assert_eq!(
                fs.open(&mut missing, &CreationParams::default()).await,
                Err(FileSystemError::NotFound)
            );

            let info_a = fs.get_volume_info(VolumeInfoFlags::BASIC).await.unwrap();
            assert_eq!(info_a.filesystem_name, "MemFs");
        }
    }

    /// A path-anchored filter must not suppress volume queries, which have
    /// no path to match.
    #[tokio::test]
    async fn volume_info_logging_ignores_the_path_filter() {
        let logged = logged("^/data");
        let info = logged.get_volume_info(VolumeInfoFlags::BASIC).await.unwrap();
        assert_eq!(info.filesystem_name, "MemFs");
    }

    /// Logging enabled must still pass errors through unchanged.
    #[tokio::test]
    async fn errors_survive_logging() {
        let logged = logged(".*");
        let mut missing = FileContext::new("/gone", false);
        assert_eq!(
            logged.open(&mut missing, &CreationParams::default()).await,
            Err(FileSystemError::NotFound)
        );
    }
}
