//! Mirror backend: exposes a local directory 1:1 through the provider
//! contract.
//!
//! Each open file carries its `std::fs::File` in the context's
//! backend-private slot and uses positional I/O against it; directory
//! contexts carry nothing. Concurrency is delegated to the OS: the mirror
//! holds no lock besides its handle table, and its blocking syscalls stall
//! the dispatching worker the way any slow backend call does.

use crate::atomicfs::HandleTable;
use crate::error::{FileSystemError, FsResult};
use crate::provider::{
    CreationParams, FileAttributes, FileContext, FileInfo, FileInfoFlags, FileSystemProvider,
    VolumeInfo, VolumeInfoFlags,
};
use crate::util;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ffi::CString;
use std::fs::{File, Metadata, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub struct MirrorFileSystem {
    root: PathBuf,
    handles: HandleTable,
}

impl MirrorFileSystem {
    /// `root` must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> FsResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(FileSystemError::InitFailure);
        }
        Ok(MirrorFileSystem {
            root,
            handles: HandleTable::new(),
        })
    }

    // Normalization pins the path under the root even when the provider is
    // used directly, without the host in front.
    fn full_path(&self, path: &str) -> PathBuf {
        let path = util::normalize_path(path);
        self.root.join(path.trim_start_matches('/'))
    }

    fn file_of<'a>(&self, ctx: &'a FileContext) -> FsResult<&'a File> {
        ctx.user::<File>().ok_or(FileSystemError::GeneralError)
    }

    fn open_for_io(path: &Path) -> FsResult<File> {
        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => Ok(file),
            // Read-only files still open for reading.
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                Ok(OpenOptions::new().read(true).open(path)?)
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn info_from(meta: &Metadata, name: &str) -> FileInfo {
    let mut attributes = FileAttributes::empty();
    if meta.is_dir() {
        attributes |= FileAttributes::DIRECTORY;
    }
    if meta.permissions().readonly() {
        attributes |= FileAttributes::READONLY;
    }
    if name.starts_with('.') {
        attributes |= FileAttributes::HIDDEN;
    }
    FileInfo {
        attributes,
        size: meta.len(),
        allocation_size: meta.len(),
        created_at: meta.created().unwrap_or(SystemTime::UNIX_EPOCH),
        modified_at: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        accessed_at: meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
    }
}

fn file_name(path: &str) -> &str {
    util::split_path(path).1
}

#[async_trait]
impl FileSystemProvider for MirrorFileSystem {
    async fn get_volume_info(&self, flags: VolumeInfoFlags) -> FsResult<VolumeInfo> {
        let mut info = VolumeInfo {
            volume_name: self
                .root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            filesystem_name: "MirrorFs".to_string(),
            ..Default::default()
        };
        if flags.contains(VolumeInfoFlags::BASIC) {
            if let Ok(meta) = std::fs::metadata(&self.root) {
                info.created_at = meta.created().unwrap_or(SystemTime::UNIX_EPOCH);
            }
        }
        if flags.contains(VolumeInfoFlags::SIZE) {
            let path = CString::new(self.root.to_string_lossy().into_owned())
                .map_err(|_| FileSystemError::GeneralError)?;
            let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
            if unsafe { libc::statvfs(path.as_ptr(), &mut stat) } != 0 {
                return Err(FileSystemError::GeneralError);
            }
            info.total_size = stat.f_blocks as u64 * stat.f_frsize as u64;
            info.free_size = stat.f_bavail as u64 * stat.f_frsize as u64;
        }
        Ok(info)
    }

    async fn create(&self, ctx: &mut FileContext, params: &CreationParams) -> FsResult<()> {
        let full = self.full_path(&ctx.path);
        if params.directory {
            std::fs::create_dir(&full)?;
        } else {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&full)?;
            if params.readonly {
                let mut perms = file.metadata()?.permissions();
                perms.set_readonly(true);
                std::fs::set_permissions(&full, perms)?;
            }
            ctx.user_context = Some(Box::new(file));
        }
        ctx.is_directory = params.directory;
        ctx.handle = self.handles.acquire();
        Ok(())
    }

    async fn open(&self, ctx: &mut FileContext, _params: &CreationParams) -> FsResult<()> {
        let full = self.full_path(&ctx.path);
        let meta = std::fs::metadata(&full)?;
        ctx.is_directory = meta.is_dir();
        if !ctx.is_directory {
            ctx.user_context = Some(Box::new(Self::open_for_io(&full)?));
        }
        ctx.handle = self.handles.acquire();
        Ok(())
    }

    async fn read(&self, ctx: &FileContext, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let file = self.file_of(ctx)?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read_at(&mut buf[filled..], offset + filled as u64)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    async fn write(
        &self,
        ctx: &FileContext,
        data: &[u8],
        offset: u64,
        write_to_eof: bool,
    ) -> FsResult<usize> {
        let file = self.file_of(ctx)?;
        let offset = if write_to_eof {
            file.metadata()?.len()
        } else {
            offset
        };
        file.write_all_at(data, offset)?;
        Ok(data.len())
    }

    async fn close(&self, ctx: &mut FileContext) -> FsResult<()> {
        // Dropping the File closes the descriptor.
        ctx.user_context = None;
        self.handles.release(ctx.handle);
        ctx.handle = 0;
        Ok(())
    }

    async fn delete(&self, ctx: &FileContext, check_only: bool) -> FsResult<()> {
        let full = self.full_path(&ctx.path);
        if check_only {
            let meta = std::fs::metadata(&full)?;
            if meta.is_dir() && std::fs::read_dir(&full)?.next().is_some() {
                return Err(FileSystemError::CannotDelete);
            }
            if !meta.is_dir() && meta.permissions().readonly() {
                return Err(FileSystemError::AccessDenied);
            }
            return Ok(());
        }
        if ctx.is_directory {
            std::fs::remove_dir(&full)?;
        } else {
            std::fs::remove_file(&full)?;
        }
        Ok(())
    }

    async fn rename(
        &self,
        ctx: &mut FileContext,
        new_path: &str,
        replace_if_exists: bool,
    ) -> FsResult<()> {
        let new_path = util::normalize_path(new_path);
        let new_full = self.full_path(&new_path);
        if !replace_if_exists && new_full.exists() {
            return Err(FileSystemError::FileExist);
        }
        std::fs::rename(self.full_path(&ctx.path), &new_full)?;
        ctx.path = new_path;
        Ok(())
    }

    async fn get_file_info(&self, ctx: &FileContext) -> FsResult<FileInfo> {
        let meta = match ctx.user::<File>() {
            Some(file) => file.metadata()?,
            None => std::fs::metadata(self.full_path(&ctx.path))?,
        };
        Ok(info_from(&meta, file_name(&ctx.path)))
    }

    async fn set_file_info(
        &self,
        ctx: &FileContext,
        info: &FileInfo,
        flags: FileInfoFlags,
    ) -> FsResult<()> {
        if flags.intersects(FileInfoFlags::TIMES | FileInfoFlags::ALLOC_SIZE) {
            return Err(FileSystemError::NotImplemented);
        }
        if flags.contains(FileInfoFlags::SIZE) {
            self.file_of(ctx)?.set_len(info.size)?;
        }
        if flags.contains(FileInfoFlags::ATTRIBUTES) {
            let full = self.full_path(&ctx.path);
            let mut perms = std::fs::metadata(&full)?.permissions();
            perms.set_readonly(info.attributes.contains(FileAttributes::READONLY));
            std::fs::set_permissions(&full, perms)?;
        }
        Ok(())
    }

    async fn find_files(
        &self,
        ctx: &FileContext,
        pattern: &str,
    ) -> FsResult<BTreeMap<String, FileInfo>> {
        let mut entries = BTreeMap::new();
        for entry in std::fs::read_dir(self.full_path(&ctx.path))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !util::glob_match(pattern, &name) {
                continue;
            }
            let meta = entry.metadata()?;
            let info = info_from(&meta, &name);
            entries.insert(name, info);
        }
        Ok(entries)
    }
}
