//! Native file access over the SFTP subsystem
//!
//! `NativeFileSession` is written against the `SftpBackend` primitives so the
//! listing, link resolution and recursive removal logic is independent of the
//! wire client. `RusshSftpBackend` is the real implementation.

use std::path::Path;

use async_trait::async_trait;
use russh_sftp::client::SftpSession as RusshSftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::path_utils::{is_absolute_remote_path, join_remote_path};
use super::types::{Attributes, DirEntry, FileItem};
use crate::error::{Error, Result};
use crate::ssh::Connection;

/// Primitive operations of the file-transfer subprotocol
#[async_trait]
pub trait SftpBackend: Send + Sync {
    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>>;
    async fn read_link(&self, path: &str) -> Result<String>;
    /// Follows symlinks
    async fn stat(&self, path: &str) -> Result<Attributes>;
    /// Does not follow symlinks
    async fn lstat(&self, path: &str) -> Result<Attributes>;
    async fn remove_file(&self, path: &str) -> Result<()>;
    async fn remove_dir(&self, path: &str) -> Result<()>;
    /// Copy a remote file to `local`, returns bytes written
    async fn download(&self, remote: &str, local: &Path) -> Result<u64>;
    /// Copy `local` to a remote file, returns bytes written
    async fn upload(&self, local: &Path, remote: &str) -> Result<u64>;
    async fn close(&self) -> Result<()>;
}

pub struct NativeFileSession {
    backend: Box<dyn SftpBackend>,
}

impl NativeFileSession {
    /// Start the SFTP subsystem on `conn` and probe it
    pub async fn open(conn: &Connection, probe_path: &str) -> Result<Self> {
        info!("Opening SFTP subsystem on {}", conn.device());

        let channel = conn.open_channel().await?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| Error::CapabilityUnavailable(format!("sftp subsystem: {}", e)))?;

        let sftp = RusshSftpSession::new(channel.into_stream())
            .await
            .map_err(|e| Error::CapabilityUnavailable(format!("sftp init: {}", e)))?;

        Self::with_backend(Box::new(RusshSftpBackend::new(sftp)), probe_path).await
    }

    /// Wrap `backend` after a canary stat of `probe_path`.
    ///
    /// A failed probe closes the backend and yields `CapabilityUnavailable`.
    pub async fn with_backend(backend: Box<dyn SftpBackend>, probe_path: &str) -> Result<Self> {
        if let Err(e) = backend.stat(probe_path).await {
            warn!("SFTP probe of {} failed: {}", probe_path, e);
            let _ = backend.close().await;
            return Err(Error::CapabilityUnavailable(format!(
                "sftp probe of {} failed: {}",
                probe_path, e
            )));
        }
        Ok(Self { backend })
    }

    pub async fn readdir(&self, location: &str) -> Result<Vec<DirEntry>> {
        self.backend.read_dir(location).await
    }

    pub async fn readdir_ext(&self, location: &str) -> Result<Vec<FileItem>> {
        let entries = self.backend.read_dir(location).await?;
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.attrs.is_symlink() {
                items.push(self.resolve_link(location, entry.filename).await);
            } else {
                let abspath = join_remote_path(location, &entry.filename);
                items.push(FileItem::from_entry(abspath, entry));
            }
        }
        Ok(items)
    }

    /// Never fails: an unreadable or dangling link becomes a broken item
    async fn resolve_link(&self, dir: &str, filename: String) -> FileItem {
        let link_path = join_remote_path(dir, &filename);
        let target = match self.backend.read_link(&link_path).await {
            Ok(target) => target,
            Err(e) => {
                warn!("Failed to read link {}: {}", link_path, e);
                return FileItem::broken_link(filename, link_path, String::new());
            }
        };

        let full_path = if is_absolute_remote_path(&target) {
            join_remote_path("/", &target)
        } else {
            join_remote_path(dir, &target)
        };

        match self.backend.stat(&full_path).await {
            Ok(attrs) => FileItem::resolved_link(filename, full_path, target, attrs),
            Err(e) => {
                debug!("Failed to stat link target {}: {}", full_path, e);
                FileItem::broken_link(filename, full_path, target)
            }
        }
    }

    pub async fn readlink(&self, path: &str) -> Result<String> {
        self.backend.read_link(path).await
    }

    pub async fn stat(&self, path: &str) -> Result<Attributes> {
        self.backend.stat(path).await
    }

    /// Remove a file, or a directory tree when `recursive`.
    ///
    /// Symlinks are removed, never followed. Not transactional: children
    /// removed before a failure stay removed.
    pub async fn rm(&self, path: &str, recursive: bool) -> Result<()> {
        let attrs = self.backend.lstat(path).await?;
        if !attrs.is_dir() {
            return self.backend.remove_file(path).await;
        }
        if !recursive {
            return Err(Error::IsADirectory(path.to_string()));
        }

        for child in self.backend.read_dir(path).await? {
            let child_path = join_remote_path(path, &child.filename);
            // Boxed to avoid an infinitely sized future
            Box::pin(self.rm(&child_path, true)).await?;
        }
        self.backend.remove_dir(path).await
    }

    pub async fn get(&self, remote: &str, local: &Path) -> Result<()> {
        let bytes = self.backend.download(remote, local).await?;
        debug!("Downloaded {} ({} bytes)", remote, bytes);
        Ok(())
    }

    pub async fn put(&self, local: &Path, remote: &str) -> Result<()> {
        let bytes = self.backend.upload(local, remote).await?;
        debug!("Uploaded {} ({} bytes)", remote, bytes);
        Ok(())
    }

    pub async fn end(&self) -> Result<()> {
        self.backend.close().await
    }
}

/// `SftpBackend` over a russh-sftp client session
pub struct RusshSftpBackend {
    sftp: RusshSftpSession,
}

impl RusshSftpBackend {
    pub fn new(sftp: RusshSftpSession) -> Self {
        Self { sftp }
    }
}

fn sftp_err(path: &str, err: russh_sftp::client::error::Error) -> Error {
    Error::Sftp(format!("{}: {}", path, err))
}

impl From<FileAttributes> for Attributes {
    fn from(attrs: FileAttributes) -> Self {
        Self {
            mode: attrs.permissions.unwrap_or(0),
            uid: attrs.uid.unwrap_or(0),
            gid: attrs.gid.unwrap_or(0),
            size: attrs.size.unwrap_or(0),
            atime: attrs.atime.map(f64::from).unwrap_or(0.0),
            mtime: attrs.mtime.map(f64::from).unwrap_or(0.0),
        }
    }
}

#[async_trait]
impl SftpBackend for RusshSftpBackend {
    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let read_dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| sftp_err(path, e))?;

        Ok(read_dir
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| {
                let filename = entry.file_name();
                DirEntry {
                    longname: filename.clone(),
                    filename,
                    attrs: entry.metadata().into(),
                }
            })
            .collect())
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        self.sftp.read_link(path).await.map_err(|e| sftp_err(path, e))
    }

    async fn stat(&self, path: &str) -> Result<Attributes> {
        self.sftp
            .metadata(path)
            .await
            .map(Attributes::from)
            .map_err(|e| sftp_err(path, e))
    }

    async fn lstat(&self, path: &str) -> Result<Attributes> {
        self.sftp
            .symlink_metadata(path)
            .await
            .map(Attributes::from)
            .map_err(|e| sftp_err(path, e))
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| sftp_err(path, e))
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        self.sftp
            .remove_dir(path)
            .await
            .map_err(|e| sftp_err(path, e))
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<u64> {
        let mut remote_file = self
            .sftp
            .open(remote)
            .await
            .map_err(|e| sftp_err(remote, e))?;
        let mut local_file = tokio::fs::File::create(local)
            .await
            .map_err(|e| Error::Transfer(format!("{}: {}", local.display(), e)))?;

        let bytes = tokio::io::copy(&mut remote_file, &mut local_file)
            .await
            .map_err(|e| Error::Transfer(format!("{}: {}", remote, e)))?;
        local_file
            .flush()
            .await
            .map_err(|e| Error::Transfer(format!("{}: {}", local.display(), e)))?;
        Ok(bytes)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<u64> {
        let mut local_file = tokio::fs::File::open(local)
            .await
            .map_err(|e| Error::Transfer(format!("{}: {}", local.display(), e)))?;
        let mut remote_file = self
            .sftp
            .create(remote)
            .await
            .map_err(|e| sftp_err(remote, e))?;

        let bytes = tokio::io::copy(&mut local_file, &mut remote_file)
            .await
            .map_err(|e| Error::Transfer(format!("{}: {}", remote, e)))?;
        remote_file
            .shutdown()
            .await
            .map_err(|e| Error::Transfer(format!("{}: {}", remote, e)))?;
        Ok(bytes)
    }

    async fn close(&self) -> Result<()> {
        self.sftp.close().await.map_err(|e| sftp_err("close", e))
    }
}
