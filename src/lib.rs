#[macro_use]
extern crate log;

pub mod atomicfs;
pub mod error;
pub mod host;
pub mod logger;
pub mod memory;
pub mod mirror;
pub mod provider;
pub mod rest;
pub mod util;
pub mod wrapper;

pub use atomicfs::{AtomicBackend, AtomicFileSystem};
pub use error::{FileSystemError, FsResult};
pub use host::{DriverRequest, FileSystemHost, HostState, MountConfig};
pub use logger::{FileSystemLogger, LogFlags};
pub use memory::MemoryFileSystem;
pub use mirror::MirrorFileSystem;
pub use rest::RestFileSystem;
pub use provider::{
    CreationParams, FileAttributes, FileContext, FileInfo, FileInfoFlags, FileSystemProvider,
    VolumeInfo, VolumeInfoFlags,
};
pub use wrapper::FileSystemWrapper;
