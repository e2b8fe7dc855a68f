//! Synthetic in-memory backend: a flat map of normalized paths to nodes.
//!
//! Exists as the simplest complete `AtomicBackend`; the adapter tests and
//! the host tests run against it.

use crate::atomicfs::AtomicBackend;
use crate::error::{FileSystemError, FsResult};
use crate::provider::{FileAttributes, FileInfo, VolumeInfo};
use crate::util;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::SystemTime;

const VOLUME_SIZE: u64 = 64 << 20;

struct Node {
    directory: bool,
    data: Vec<u8>,
    created_at: SystemTime,
    modified_at: SystemTime,
}

impl Node {
    fn new(directory: bool) -> Self {
        let now = SystemTime::now();
        Node {
            directory,
            data: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }

    fn info(&self) -> FileInfo {
        let mut attributes = FileAttributes::empty();
        if self.directory {
            attributes |= FileAttributes::DIRECTORY;
        }
        FileInfo {
            attributes,
            size: self.data.len() as u64,
            allocation_size: self.data.capacity() as u64,
            created_at: self.created_at,
            modified_at: self.modified_at,
            accessed_at: self.modified_at,
        }
    }
}

pub struct MemoryFileSystem {
    nodes: Mutex<BTreeMap<String, Node>>,
    created_at: SystemTime,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::new(true));
        MemoryFileSystem {
            nodes: Mutex::new(nodes),
            created_at: SystemTime::now(),
        }
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Direct children of `dir` within the flat key space.
fn child_name<'a>(dir: &str, key: &'a str) -> Option<&'a str> {
    let rest = if dir == "/" {
        key.strip_prefix('/')?
    } else {
        key.strip_prefix(dir)?.strip_prefix('/')?
    };
    (!rest.is_empty() && !rest.contains('/')).then_some(rest)
}

#[async_trait]
impl AtomicBackend for MemoryFileSystem {
    async fn volume_info(&self) -> FsResult<VolumeInfo> {
        let used: u64 = {
            let nodes = self.nodes.lock().unwrap();
            nodes.values().map(|n| n.data.len() as u64).sum()
        };
        Ok(VolumeInfo {
            volume_name: "memory".to_string(),
            filesystem_name: "MemFs".to_string(),
            total_size: VOLUME_SIZE,
            free_size: VOLUME_SIZE.saturating_sub(used),
            created_at: self.created_at,
            ..Default::default()
        })
    }

    async fn create_new(&self, path: &str, is_directory: bool) -> FsResult<FileInfo> {
        let path = util::normalize_path(path);
        let (parent, _) = util::split_path(&path);
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get(parent) {
            Some(node) if node.directory => {}
            _ => return Err(FileSystemError::NotFound),
        }
        if nodes.contains_key(&path) {
            return Err(FileSystemError::FileExist);
        }
        let node = Node::new(is_directory);
        let info = node.info();
        nodes.insert(path, node);
        Ok(info)
    }

    async fn read_at(&self, path: &str, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let nodes = self.nodes.lock().unwrap();
        let node = nodes.get(path).ok_or(FileSystemError::NotFound)?;
        if node.directory {
            return Err(FileSystemError::AccessDenied);
        }
        let start = (offset as usize).min(node.data.len());
        let end = (start + buf.len()).min(node.data.len());
        buf[..end - start].copy_from_slice(&node.data[start..end]);
        Ok(end - start)
    }

    async fn write_at(&self, path: &str, data: &[u8], offset: u64) -> FsResult<usize> {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes.get_mut(path).ok_or(FileSystemError::NotFound)?;
        if node.directory {
            return Err(FileSystemError::AccessDenied);
        }
        let offset = usize::try_from(offset).map_err(|_| FileSystemError::GeneralError)?;
        let end = offset
            .checked_add(data.len())
            .ok_or(FileSystemError::GeneralError)?;
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[offset..end].copy_from_slice(data);
        node.modified_at = SystemTime::now();
        Ok(data.len())
    }

    async fn file_info(&self, path: &str) -> FsResult<FileInfo> {
        let nodes = self.nodes.lock().unwrap();
        nodes
            .get(path)
            .map(Node::info)
            .ok_or(FileSystemError::NotFound)
    }

    async fn set_file_size(&self, path: &str, size: u64) -> FsResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes.get_mut(path).ok_or(FileSystemError::NotFound)?;
        if node.directory {
            return Err(FileSystemError::AccessDenied);
        }
        node.data.resize(size as usize, 0);
        node.modified_at = SystemTime::now();
        Ok(())
    }

    async fn list_dir(&self, path: &str) -> FsResult<BTreeMap<String, FileInfo>> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(node) if node.directory => {}
            Some(_) => return Err(FileSystemError::AccessDenied),
            None => return Err(FileSystemError::NotFound),
        }
        Ok(nodes
            .iter()
            .filter_map(|(key, node)| {
                child_name(path, key).map(|name| (name.to_string(), node.info()))
            })
            .collect())
    }

    async fn delete(&self, path: &str, check_only: bool) -> FsResult<()> {
        if path == "/" {
            return Err(FileSystemError::AccessDenied);
        }
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes.get(path).ok_or(FileSystemError::NotFound)?;
        if node.directory && nodes.keys().any(|key| child_name(path, key).is_some()) {
            return Err(FileSystemError::CannotDelete);
        }
        if !check_only {
            nodes.remove(path);
        }
        Ok(())
    }

    async fn rename(&self, path: &str, new_path: &str, replace_if_exists: bool) -> FsResult<()> {
        if path == "/" {
            return Err(FileSystemError::AccessDenied);
        }
        let mut nodes = self.nodes.lock().unwrap();
        if !nodes.contains_key(path) {
            return Err(FileSystemError::NotFound);
        }
        if nodes.contains_key(new_path) {
            if !replace_if_exists {
                return Err(FileSystemError::FileExist);
            }
            if nodes.keys().any(|key| child_name(new_path, key).is_some()) {
                return Err(FileSystemError::CannotDelete);
            }
            nodes.remove(new_path);
        }
        let node = nodes.remove(path).ok_or(FileSystemError::NotFound)?;
        let descendants: Vec<String> = nodes
            .keys()
            .filter(|key| key.starts_with(path) && key[path.len()..].starts_with('/'))
            .cloned()
            .collect();
        for old_key in descendants {
            let new_key = format!("{new_path}{}", &old_key[path.len()..]);
            if let Some(child) = nodes.remove(&old_key) {
                nodes.insert(new_key, child);
            }
        }
        nodes.insert(new_path.to_string(), node);
        Ok(())
    }
}
