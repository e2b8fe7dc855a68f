//! Adapter bridging whole-object backends into the byte-range provider
//! contract.
//!
//! Many stores (a remote resource reachable only via whole-resource GET/PUT
//! style calls, an in-memory map) cannot support arbitrary byte-range opens
//! with persistent per-open state. `AtomicFileSystem` implements the full
//! `FileSystemProvider` contract on top of the narrower `AtomicBackend`
//! interface such a store actually provides, owning nothing but a handle
//! table: every read, write and metadata answer is computed from the
//! backend on demand.

mod handles;

pub use handles::HandleTable;

use crate::error::{FileSystemError, FsResult};
use crate::provider::{
    CreationParams, FileContext, FileInfo, FileInfoFlags, FileSystemProvider, VolumeInfo,
    VolumeInfoFlags,
};
use crate::util;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Whole-object operations keyed by path; no persistent per-open state.
#[async_trait]
pub trait AtomicBackend: Send + Sync {
    async fn volume_info(&self) -> FsResult<VolumeInfo>;

    /// Creates the object. Fails with `FileExist` when the path is taken and
    /// `NotFound` when the parent directory is missing.
    async fn create_new(&self, path: &str, is_directory: bool) -> FsResult<FileInfo>;

    async fn read_at(&self, path: &str, buf: &mut [u8], offset: u64) -> FsResult<usize>;

    async fn write_at(&self, path: &str, data: &[u8], offset: u64) -> FsResult<usize>;

    async fn file_info(&self, path: &str) -> FsResult<FileInfo>;

    async fn set_file_size(&self, path: &str, size: u64) -> FsResult<()>;

    /// Direct children of a directory, name -> metadata.
    async fn list_dir(&self, path: &str) -> FsResult<BTreeMap<String, FileInfo>>;

    async fn delete(&self, path: &str, check_only: bool) -> FsResult<()>;

    async fn rename(&self, path: &str, new_path: &str, replace_if_exists: bool) -> FsResult<()>;
}

/// `FileSystemProvider` over any `AtomicBackend`.
pub struct AtomicFileSystem<B> {
    backend: B,
    handles: HandleTable,
}

impl<B: AtomicBackend> AtomicFileSystem<B> {
    pub fn new(backend: B) -> Self {
        AtomicFileSystem {
            backend,
            handles: HandleTable::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: AtomicBackend> FileSystemProvider for AtomicFileSystem<B> {
    async fn get_volume_info(&self, _flags: VolumeInfoFlags) -> FsResult<VolumeInfo> {
        self.backend.volume_info().await
    }

    // The existence probe is not atomic with the backend create: two racing
    // creators can both pass the probe, and the last writer wins. Backends
    // with a true create-if-absent primitive report `FileExist` from
    // `create_new` itself, closing the window.
    async fn create(&self, ctx: &mut FileContext, params: &CreationParams) -> FsResult<()> {
        match self.backend.file_info(&ctx.path).await {
            Ok(_) => return Err(FileSystemError::FileExist),
            Err(FileSystemError::NotFound) => {}
            Err(err) => return Err(err),
        }
        let info = self.backend.create_new(&ctx.path, params.directory).await?;
        ctx.is_directory = info.is_directory();
        ctx.handle = self.handles.acquire();
        Ok(())
    }

    async fn open(&self, ctx: &mut FileContext, _params: &CreationParams) -> FsResult<()> {
        let info = self.backend.file_info(&ctx.path).await?;
        ctx.is_directory = info.is_directory();
        ctx.handle = self.handles.acquire();
        Ok(())
    }

    async fn read(&self, ctx: &FileContext, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.backend.read_at(&ctx.path, buf, offset).await
    }

    async fn write(
        &self,
        ctx: &FileContext,
        data: &[u8],
        offset: u64,
        write_to_eof: bool,
    ) -> FsResult<usize> {
        // Point-in-time size read; concurrent writers to the same path can
        // interleave between the query and the write.
        let offset = if write_to_eof {
            self.backend.file_info(&ctx.path).await?.size
        } else {
            offset
        };
        self.backend.write_at(&ctx.path, data, offset).await
    }

    async fn close(&self, ctx: &mut FileContext) -> FsResult<()> {
        self.handles.release(ctx.handle);
        ctx.handle = 0;
        ctx.user_context = None;
        Ok(())
    }

    async fn delete(&self, ctx: &FileContext, check_only: bool) -> FsResult<()> {
        self.backend.delete(&ctx.path, check_only).await
    }

    async fn rename(
        &self,
        ctx: &mut FileContext,
        new_path: &str,
        replace_if_exists: bool,
    ) -> FsResult<()> {
        let new_path = util::normalize_path(new_path);
        self.backend
            .rename(&ctx.path, &new_path, replace_if_exists)
            .await?;
        ctx.path = new_path;
        Ok(())
    }

    async fn get_file_info(&self, ctx: &FileContext) -> FsResult<FileInfo> {
        self.backend.file_info(&ctx.path).await
    }

    async fn set_file_info(
        &self,
        ctx: &FileContext,
        info: &FileInfo,
        flags: FileInfoFlags,
    ) -> FsResult<()> {
        if flags == FileInfoFlags::SIZE {
            self.backend.set_file_size(&ctx.path, info.size).await
        } else {
            Err(FileSystemError::NotImplemented)
        }
    }

    async fn find_files(
        &self,
        ctx: &FileContext,
        pattern: &str,
    ) -> FsResult<BTreeMap<String, FileInfo>> {
        let mut entries = self.backend.list_dir(&ctx.path).await?;
        if !(pattern.is_empty() || pattern == "*") {
            entries.retain(|name, _| util::glob_match(pattern, name));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFileSystem;

    fn adapter() -> AtomicFileSystem<MemoryFileSystem> {
        AtomicFileSystem::new(MemoryFileSystem::new())
    }

    #[tokio::test]
    async fn open_missing_path_is_not_found_and_stateless() {
        let fs = adapter();
        let mut ctx = FileContext::new("/nope.txt", false);
        let err = fs.open(&mut ctx, &CreationParams::default()).await;
        assert_eq!(err, Err(FileSystemError::NotFound));
        assert_eq!(ctx.handle, 0);
        // The failed open must not have created the path.
        let err = fs.open(&mut ctx, &CreationParams::default()).await;
        assert_eq!(err, Err(FileSystemError::NotFound));
    }

    #[tokio::test]
    async fn create_existing_path_is_file_exist() {
        let fs = adapter();
        let mut ctx = FileContext::new("/a.txt", false);
        fs.create(&mut ctx, &CreationParams::default()).await.unwrap();
        let mut again = FileContext::new("/a.txt", false);
        assert_eq!(
            fs.create(&mut again, &CreationParams::default()).await,
            Err(FileSystemError::FileExist)
        );
    }

    #[tokio::test]
    async fn handles_are_unique_until_released() {
        let fs = adapter();
        let mut contexts = Vec::new();
        for i in 0..8 {
            let mut ctx = FileContext::new(format!("/f{i}"), false);
            fs.create(&mut ctx, &CreationParams::default()).await.unwrap();
            contexts.push(ctx);
        }
        let mut ids: Vec<u64> = contexts.iter().map(|c| c.handle).collect();
        assert!(ids.iter().all(|&h| h != 0));
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), contexts.len());
    }

    #[tokio::test]
    async fn whole_flow_scenario() {
        let fs = adapter();

        fs.backend().create_new("/a.txt", false).await.unwrap();

        let mut ctx = FileContext::new("/a.txt", false);
        fs.open(&mut ctx, &CreationParams::default()).await.unwrap();
        assert_eq!(ctx.handle, 1);
        assert!(!ctx.is_directory);

        let written = fs.write(&ctx, b"hello", 0, false).await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(fs.get_file_info(&ctx).await.unwrap().size, 5);

        fs.close(&mut ctx).await.unwrap();
        assert_eq!(ctx.handle, 0);

        // The freed id is reused for the next open on a different path.
        fs.backend().create_new("/b.txt", false).await.unwrap();
        let mut other = FileContext::new("/b.txt", false);
        fs.open(&mut other, &CreationParams::default()).await.unwrap();
        assert_eq!(other.handle, 1);
    }

    #[tokio::test]
    async fn write_to_eof_appends_at_current_size() {
        let fs = adapter();
        let mut ctx = FileContext::new("/log", false);
        fs.create(&mut ctx, &CreationParams::default()).await.unwrap();
        fs.write(&ctx, b"abc", 0, false).await.unwrap();
        fs.write(&ctx, b"def", 0, true).await.unwrap();

        let mut buf = [0u8; 16];
        let n = fs.read(&ctx, &mut buf, 0).await.unwrap();
        assert_eq!(&buf[..n], b"abcdef");
    }

    #[tokio::test]
    async fn rename_collision_policy() {
        let fs = adapter();
        let mut src = FileContext::new("/src", false);
        fs.create(&mut src, &CreationParams::default()).await.unwrap();
        let mut dst = FileContext::new("/dst", false);
        fs.create(&mut dst, &CreationParams::default()).await.unwrap();

        assert_eq!(
            fs.rename(&mut src, "/dst", false).await,
            Err(FileSystemError::FileExist)
        );
        assert_eq!(src.path, "/src");

        fs.rename(&mut src, "/dst", true).await.unwrap();
        assert_eq!(src.path, "/dst");

        let mut old = FileContext::new("/src", false);
        assert_eq!(
            fs.open(&mut old, &CreationParams::default()).await,
            Err(FileSystemError::NotFound)
        );
    }

    #[tokio::test]
    async fn only_size_subset_of_set_file_info_is_honored() {
        let fs = adapter();
        let mut ctx = FileContext::new("/a", false);
        fs.create(&mut ctx, &CreationParams::default()).await.unwrap();

        let mut info = FileInfo::default();
        info.size = 32;
        fs.set_file_info(&ctx, &info, FileInfoFlags::SIZE).await.unwrap();
        assert_eq!(fs.get_file_info(&ctx).await.unwrap().size, 32);

        assert_eq!(
            fs.set_file_info(&ctx, &info, FileInfoFlags::TIMES).await,
            Err(FileSystemError::NotImplemented)
        );
        assert_eq!(
            fs.set_file_info(&ctx, &info, FileInfoFlags::SIZE | FileInfoFlags::TIMES)
                .await,
            Err(FileSystemError::NotImplemented)
        );
    }

    #[tokio::test]
    async fn find_files_applies_glob() {
        let fs = adapter();
        for name in ["/d", "/d/a.txt", "/d/b.txt", "/d/c.log"] {
            fs.backend()
                .create_new(name, name == "/d")
                .await
                .unwrap();
        }
        let mut dir = FileContext::new("/d", true);
        fs.open(&mut dir, &CreationParams::directory()).await.unwrap();

        let all = fs.find_files(&dir, "*").await.unwrap();
        assert_eq!(all.len(), 3);
        let txt = fs.find_files(&dir, "*.txt").await.unwrap();
        assert_eq!(
            txt.keys().cloned().collect::<Vec<_>>(),
            vec!["a.txt".to_string(), "b.txt".to_string()]
        );
    }
}
