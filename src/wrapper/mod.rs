//! Volume-identity decorator: presents an inner provider under a
//! configured volume and filesystem name, forwarding everything else
//! untouched. Stacks freely with other decorators.

use crate::error::FsResult;
use crate::provider::{
    CreationParams, FileContext, FileInfo, FileInfoFlags, FileSystemProvider, VolumeInfo,
    VolumeInfoFlags,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

pub struct FileSystemWrapper<P> {
    inner: P,
    volume_name: String,
    filesystem_name: String,
}

impl<P: FileSystemProvider> FileSystemWrapper<P> {
    pub fn new(
        inner: P,
        volume_name: impl Into<String>,
        filesystem_name: impl Into<String>,
    ) -> Self {
        FileSystemWrapper {
            inner,
            volume_name: volume_name.into(),
            filesystem_name: filesystem_name.into(),
        }
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

#[async_trait]
impl<P: FileSystemProvider> FileSystemProvider for FileSystemWrapper<P> {
    /// Size and time fields come from the inner provider; only the identity
    /// is substituted.
    async fn get_volume_info(&self, flags: VolumeInfoFlags) -> FsResult<VolumeInfo> {
        let mut info = self.inner.get_volume_info(flags).await?;
        info.volume_name = self.volume_name.clone();
        info.filesystem_name = self.filesystem_name.clone();
        Ok(info)
    }

    async fn create(&self, ctx: &mut FileContext, params: &CreationParams) -> FsResult<()> {
        self.inner.create(ctx, params).await
    }

    async fn open(&self, ctx: &mut FileContext, params: &CreationParams) -> FsResult<()> {
        self.inner.open(ctx, params).await
    }

    async fn read(&self, ctx: &FileContext, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.inner.read(ctx, buf, offset).await
    }

    async fn write(
        &self,
        ctx: &FileContext,
        data: &[u8],
        offset: u64,
        write_to_eof: bool,
    ) -> FsResult<usize> {
        self.inner.write(ctx, data, offset, write_to_eof).await
    }

    async fn close(&self, ctx: &mut FileContext) -> FsResult<()> {
        self.inner.close(ctx).await
    }

    async fn delete(&self, ctx: &FileContext, check_only: bool) -> FsResult<()> {
        self.inner.delete(ctx, check_only).await
    }

    async fn rename(
        &self,
        ctx: &mut FileContext,
        new_path: &str,
        replace_if_exists: bool,
    ) -> FsResult<()> {
        self.inner.rename(ctx, new_path, replace_if_exists).await
    }

    async fn get_file_info(&self, ctx: &FileContext) -> FsResult<FileInfo> {
        self.inner.get_file_info(ctx).await
    }

    async fn set_file_info(
        &self,
        ctx: &FileContext,
        info: &FileInfo,
        flags: FileInfoFlags,
    ) -> FsResult<()> {
        self.inner.set_file_info(ctx, info, flags).await
    }

    async fn find_files(
        &self,
        ctx: &FileContext,
        pattern: &str,
    ) -> FsResult<BTreeMap<String, FileInfo>> {
        self.inner.find_files(ctx, pattern).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomicfs::AtomicFileSystem;
    use crate::memory::MemoryFileSystem;

    #[tokio::test]
    async fn substitutes_identity_and_keeps_sizes() {
        let inner = AtomicFileSystem::new(MemoryFileSystem::new());
        let base = inner.get_volume_info(VolumeInfoFlags::all()).await.unwrap();

        let wrapped = FileSystemWrapper::new(inner, "backup", "BackupFs");
        let info = wrapped.get_volume_info(VolumeInfoFlags::all()).await.unwrap();
        assert_eq!(info.volume_name, "backup");
        assert_eq!(info.filesystem_name, "BackupFs");
        assert_eq!(info.total_size, base.total_size);
        assert_eq!(info.created_at, base.created_at);
    }

    #[tokio::test]
    async fn forwards_file_operations_unchanged() {
        let wrapped = FileSystemWrapper::new(
            AtomicFileSystem::new(MemoryFileSystem::new()),
            "v",
            "F",
        );
        let mut ctx = FileContext::new("/a", false);
        wrapped.create(&mut ctx, &CreationParams::default()).await.unwrap();
        wrapped.write(&ctx, b"data", 0, false).await.unwrap();
        assert_eq!(wrapped.get_file_info(&ctx).await.unwrap().size, 4);
        wrapped.close(&mut ctx).await.unwrap();
        assert_eq!(ctx.handle, 0);
    }
}
