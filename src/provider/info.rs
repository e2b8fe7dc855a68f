//! Plain metadata types produced and consumed across the provider boundary.

use bitflags::bitflags;
use std::time::SystemTime;

bitflags! {
    /// Selects how much volume detail a `get_volume_info` call computes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VolumeInfoFlags: u32 {
        /// Names, creation time and static parameters.
        const BASIC = 1;
        /// Total/free sizes (may require a backend round trip).
        const SIZE = 2;
    }
}

bitflags! {
    /// Selects which subset of a `FileInfo` a `set_file_info` call applies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileInfoFlags: u32 {
        const ATTRIBUTES = 1;
        const TIMES = 2;
        const SIZE = 4;
        const ALLOC_SIZE = 8;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileAttributes: u32 {
        const DIRECTORY = 1;
        const READONLY = 2;
        const HIDDEN = 4;
    }
}

/// Volume identity and capacity. Immutable per mount; queried, never mutated
/// by clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub volume_name: String,
    pub filesystem_name: String,
    pub total_size: u64,
    pub free_size: u64,
    pub created_at: SystemTime,
    pub serial_number: u32,
    pub sector_size: u32,
    pub max_path_length: u32,
}

impl Default for VolumeInfo {
    fn default() -> Self {
        VolumeInfo {
            volume_name: String::new(),
            filesystem_name: String::new(),
            total_size: 0,
            free_size: 0,
            created_at: SystemTime::UNIX_EPOCH,
            serial_number: 0,
            sector_size: 512,
            max_path_length: 8192,
        }
    }
}

/// Snapshot of one file's metadata. Produced fresh on every query; the
/// provider layer never caches these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub attributes: FileAttributes,
    pub size: u64,
    pub allocation_size: u64,
    pub created_at: SystemTime,
    pub modified_at: SystemTime,
    pub accessed_at: SystemTime,
}

impl Default for FileInfo {
    fn default() -> Self {
        FileInfo {
            attributes: FileAttributes::empty(),
            size: 0,
            allocation_size: 0,
            created_at: SystemTime::UNIX_EPOCH,
            modified_at: SystemTime::UNIX_EPOCH,
            accessed_at: SystemTime::UNIX_EPOCH,
        }
    }
}

impl FileInfo {
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }
}
