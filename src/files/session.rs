//! File session: one private connection plus the strategy chosen for it

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::fallback::FallbackFileSession;
use super::native::NativeFileSession;
use super::path_utils::remote_basename;
use super::types::{Attributes, DirEntry, FileItem};
use crate::error::{Error, ErrorKind, Result};
use crate::ssh::Connection;

/// Distinguishes temp downloads started within the same millisecond
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Errors meaning the device has no usable SFTP, as opposed to no transport
fn sftp_missing(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::CapabilityUnavailable | ErrorKind::SftpFailure
    )
}

pub enum FileStrategy {
    Native(NativeFileSession),
    Fallback(FallbackFileSession),
}

pub struct FileSession {
    device: String,
    connection: Option<Connection>,
    strategy: FileStrategy,
    temp_dir: PathBuf,
}

impl FileSession {
    /// Pick a strategy for `conn`, which the session then owns.
    ///
    /// The SFTP subsystem is tried first. If the device lacks it, exec
    /// helpers on the same connection take over; a dead transport is an error.
    pub async fn open(conn: Connection, probe_path: &str, temp_dir: PathBuf) -> Result<Self> {
        let native = NativeFileSession::open(&conn, probe_path).await;
        let strategy = Self::choose_strategy(&conn, native)?;
        Ok(Self::new(
            conn.device().to_string(),
            Some(conn),
            strategy,
            temp_dir,
        ))
    }

    fn choose_strategy(
        conn: &Connection,
        native: Result<NativeFileSession>,
    ) -> Result<FileStrategy> {
        match native {
            Ok(native) => {
                info!("File session on {} uses SFTP", conn.device());
                Ok(FileStrategy::Native(native))
            }
            Err(e) if sftp_missing(&e) => {
                warn!(
                    "SFTP unavailable on {} ({}), falling back to exec helpers",
                    conn.device(),
                    e
                );
                Ok(FileStrategy::Fallback(FallbackFileSession::new(Arc::new(
                    conn.clone(),
                ))))
            }
            Err(e) => Err(e),
        }
    }

    pub fn new(
        device: String,
        connection: Option<Connection>,
        strategy: FileStrategy,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            device,
            connection,
            strategy,
            temp_dir,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_native(&self) -> bool {
        matches!(self.strategy, FileStrategy::Native(_))
    }

    pub async fn readdir(&self, location: &str) -> Result<Vec<DirEntry>> {
        match &self.strategy {
            FileStrategy::Native(s) => s.readdir(location).await,
            FileStrategy::Fallback(s) => s.readdir(location).await,
        }
    }

    pub async fn readdir_ext(&self, location: &str) -> Result<Vec<FileItem>> {
        match &self.strategy {
            FileStrategy::Native(s) => s.readdir_ext(location).await,
            FileStrategy::Fallback(s) => s.readdir_ext(location).await,
        }
    }

    pub async fn readlink(&self, path: &str) -> Result<String> {
        match &self.strategy {
            FileStrategy::Native(s) => s.readlink(path).await,
            FileStrategy::Fallback(s) => s.readlink(path).await,
        }
    }

    pub async fn stat(&self, path: &str) -> Result<Attributes> {
        match &self.strategy {
            FileStrategy::Native(s) => s.stat(path).await,
            FileStrategy::Fallback(s) => s.stat(path).await,
        }
    }

    pub async fn rm(&self, path: &str, recursive: bool) -> Result<()> {
        match &self.strategy {
            FileStrategy::Native(s) => s.rm(path, recursive).await,
            FileStrategy::Fallback(s) => s.rm(path, recursive).await,
        }
    }

    pub async fn get(&self, remote: &str, local: &Path) -> Result<()> {
        match &self.strategy {
            FileStrategy::Native(s) => s.get(remote, local).await,
            FileStrategy::Fallback(s) => s.get(remote, local).await,
        }
    }

    pub async fn put(&self, local: &Path, remote: &str) -> Result<()> {
        match &self.strategy {
            FileStrategy::Native(s) => s.put(local, remote).await,
            FileStrategy::Fallback(s) => s.put(local, remote).await,
        }
    }

    /// Download `remote` into the temp directory under a fresh name
    pub async fn download_to_temp(&self, remote: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;

        let basename = remote_basename(remote);
        if basename.is_empty() {
            return Err(Error::InvalidParams(format!("{} has no file name", remote)));
        }
        let name = format!(
            "{}-{}_{}",
            chrono::Utc::now().timestamp_millis(),
            TEMP_SEQ.fetch_add(1, Ordering::Relaxed),
            basename
        );
        let local = self.temp_dir.join(name);

        self.get(remote, &local).await?;
        Ok(local)
    }

    /// Close the strategy and tear down the private connection
    pub async fn end(&self) {
        if let FileStrategy::Native(s) = &self.strategy {
            if let Err(e) = s.end().await {
                warn!("Failed to close SFTP on {}: {}", self.device, e);
            }
        }
        if let Some(conn) = &self.connection {
            conn.close().await;
        }
    }
}
