//! HTTP-backed whole-object store.
//!
//! Talks to a remote endpoint through a flat command protocol: every
//! operation is one request against the base url with a `cmd` query
//! parameter (`ping`, `info`, `stat`, `list`, `read`, `write`, `create`,
//! `truncate`, `rename`, `delete`) plus operation arguments. Metadata comes
//! back as pipe-separated lines, `TYPE|NAME|MTIME|SIZE`, with `TYPE` either
//! `F` or `D` and `MTIME` in unix seconds. The endpoint is the single
//! source of truth; nothing is cached on this side.

use crate::atomicfs::AtomicBackend;
use crate::error::{FileSystemError, FsResult};
use crate::provider::{FileAttributes, FileInfo, VolumeInfo};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

pub struct RestFileSystem {
    client: reqwest::Client,
    base_url: String,
}

impl RestFileSystem {
    /// Builds the client and verifies the endpoint answers a `ping`;
    /// an unreachable or refusing endpoint fails with `InitFailure`.
    pub async fn connect(base_url: impl Into<String>, timeout: Duration) -> FsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|_| FileSystemError::InitFailure)?;
        let fs = RestFileSystem {
            client,
            base_url: base_url.into(),
        };
        let response = fs
            .client
            .get(&fs.base_url)
            .query(&[("cmd", "ping")])
            .send()
            .await
            .map_err(|_| FileSystemError::InitFailure)?;
        if !response.status().is_success() {
            return Err(FileSystemError::InitFailure);
        }
        Ok(fs)
    }

    async fn get(&self, query: &[(&str, &str)]) -> FsResult<reqwest::Response> {
        let response = self
            .client
            .get(&self.base_url)
            .query(query)
            .send()
            .await
            .map_err(transport)?;
        check(response)
    }

    async fn post(&self, query: &[(&str, &str)], body: Vec<u8>) -> FsResult<reqwest::Response> {
        let response = self
            .client
            .post(&self.base_url)
            .query(query)
            .body(body)
            .send()
            .await
            .map_err(transport)?;
        check(response)
    }
}

fn transport(err: reqwest::Error) -> FileSystemError {
    warn!("rest transport failure: {err}");
    FileSystemError::GeneralError
}

fn check(response: reqwest::Response) -> FsResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(status_error(status))
    }
}

fn status_error(status: StatusCode) -> FileSystemError {
    match status {
        StatusCode::NOT_FOUND => FileSystemError::NotFound,
        StatusCode::CONFLICT => FileSystemError::FileExist,
        StatusCode::NOT_IMPLEMENTED => FileSystemError::NotImplemented,
        status if status.is_client_error() => FileSystemError::AccessDenied,
        _ => FileSystemError::GeneralError,
    }
}

/// One `TYPE|NAME|MTIME|SIZE` line; malformed lines are dropped, a bad
/// endpoint must not take the listing down with it.
fn parse_entry(line: &str) -> Option<(String, FileInfo)> {
    let mut fields = line.split('|');
    let kind = fields.next()?;
    let name = fields.next()?;
    let mtime: u64 = fields.next()?.parse().ok()?;
    let size: u64 = fields.next()?.parse().ok()?;
    if name.is_empty() {
        return None;
    }
    let attributes = match kind {
        "F" => FileAttributes::empty(),
        "D" => FileAttributes::DIRECTORY,
        _ => return None,
    };
    let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(mtime);
    Some((
        name.to_string(),
        FileInfo {
            attributes,
            size,
            allocation_size: size,
            created_at: mtime,
            modified_at: mtime,
            accessed_at: mtime,
        },
    ))
}

#[async_trait]
impl AtomicBackend for RestFileSystem {
    /// `cmd=info` answers `VOLUME|FSNAME|TOTAL|FREE`.
    async fn volume_info(&self) -> FsResult<VolumeInfo> {
        let text = self
            .get(&[("cmd", "info")])
            .await?
            .text()
            .await
            .map_err(transport)?;
        let mut fields = text.trim().split('|');
        let volume_name = fields.next().unwrap_or_default().to_string();
        let filesystem_name = fields.next().unwrap_or_default().to_string();
        let total_size = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
        let free_size = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
        Ok(VolumeInfo {
            volume_name,
            filesystem_name,
            total_size,
            free_size,
            ..Default::default()
        })
    }

    async fn create_new(&self, path: &str, is_directory: bool) -> FsResult<FileInfo> {
        let kind = if is_directory { "D" } else { "F" };
        self.post(&[("cmd", "create"), ("path", path), ("type", kind)], Vec::new())
            .await?;
        self.file_info(path).await
    }

    async fn read_at(&self, path: &str, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let offset = offset.to_string();
        let size = buf.len().to_string();
        let body = self
            .get(&[
                ("cmd", "read"),
                ("path", path),
                ("offset", &offset),
                ("size", &size),
            ])
            .await?
            .bytes()
            .await
            .map_err(transport)?;
        let n = body.len().min(buf.len());
        buf[..n].copy_from_slice(&body[..n]);
        Ok(n)
    }

    async fn write_at(&self, path: &str, data: &[u8], offset: u64) -> FsResult<usize> {
        let offset = offset.to_string();
        self.post(
            &[("cmd", "write"), ("path", path), ("offset", &offset)],
            data.to_vec(),
        )
        .await?;
        Ok(data.len())
    }

    async fn file_info(&self, path: &str) -> FsResult<FileInfo> {
        let text = self
            .get(&[("cmd", "stat"), ("path", path)])
            .await?
            .text()
            .await
            .map_err(transport)?;
        parse_entry(text.trim())
            .map(|(_, info)| info)
            .ok_or(FileSystemError::GeneralError)
    }

    async fn set_file_size(&self, path: &str, size: u64) -> FsResult<()> {
        let size = size.to_string();
        self.post(
            &[("cmd", "truncate"), ("path", path), ("size", &size)],
            Vec::new(),
        )
        .await?;
        Ok(())
    }

    async fn list_dir(&self, path: &str) -> FsResult<BTreeMap<String, FileInfo>> {
        let text = self
            .get(&[("cmd", "list"), ("path", path)])
            .await?
            .text()
            .await
            .map_err(transport)?;
        Ok(text.lines().filter_map(parse_entry).collect())
    }

    async fn delete(&self, path: &str, check_only: bool) -> FsResult<()> {
        let check = if check_only { "1" } else { "0" };
        self.post(
            &[("cmd", "delete"), ("path", path), ("check", check)],
            Vec::new(),
        )
        .await?;
        Ok(())
    }

    async fn rename(&self, path: &str, new_path: &str, replace_if_exists: bool) -> FsResult<()> {
        let replace = if replace_if_exists { "1" } else { "0" };
        self.post(
            &[
                ("cmd", "rename"),
                ("path", path),
                ("to", new_path),
                ("replace", replace),
            ],
            Vec::new(),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_lines_parse_into_metadata() {
        let (name, info) = parse_entry("F|report.txt|1700000000|4096").unwrap();
        assert_eq!(name, "report.txt");
        assert_eq!(info.size, 4096);
        assert!(!info.is_directory());
        assert_eq!(
            info.modified_at,
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
        );

        let (name, info) = parse_entry("D|photos|1700000000|0").unwrap();
        assert_eq!(name, "photos");
        assert!(info.is_directory());
    }

    #[test]
    fn malformed_entry_lines_are_dropped() {
        assert!(parse_entry("").is_none());
        assert!(parse_entry("F|only-two").is_none());
        assert!(parse_entry("X|name|0|0").is_none());
        assert!(parse_entry("F||0|0").is_none());
        assert!(parse_entry("F|name|not-a-number|0").is_none());
    }

    #[test]
    fn listing_skips_bad_lines_without_failing() {
        let text = "F|a|0|1\ngarbage\nD|d|0|0\n";
        let entries: BTreeMap<String, FileInfo> = text.lines().filter_map(parse_entry).collect();
        assert_eq!(entries.len(), 2);
        assert!(entries["d"].is_directory());
    }

    #[test]
    fn http_statuses_map_onto_filesystem_errors() {
        assert_eq!(
            status_error(StatusCode::NOT_FOUND),
            FileSystemError::NotFound
        );
        assert_eq!(
            status_error(StatusCode::CONFLICT),
            FileSystemError::FileExist
        );
        assert_eq!(
            status_error(StatusCode::NOT_IMPLEMENTED),
            FileSystemError::NotImplemented
        );
        assert_eq!(
            status_error(StatusCode::FORBIDDEN),
            FileSystemError::AccessDenied
        );
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY),
            FileSystemError::GeneralError
        );
    }
}
