//! Configuration Storage
//!
//! Handles reading/writing the core configuration file.
//! Config location: ~/.devmgr on macOS/Linux, %APPDATA%\devmgr on Windows

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::types::{CoreConfig, CONFIG_VERSION};

/// Configuration storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },
}

impl From<StorageError> for crate::error::Error {
    fn from(err: StorageError) -> Self {
        crate::error::Error::Config(err.to_string())
    }
}

/// Get the configuration directory
pub fn config_dir() -> Result<PathBuf, StorageError> {
    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("devmgr"));
        }
        dirs::home_dir()
            .map(|home| home.join(".devmgr"))
            .ok_or(StorageError::NoConfigDir)
    }

    #[cfg(not(windows))]
    {
        dirs::home_dir()
            .map(|home| home.join(".devmgr"))
            .ok_or(StorageError::NoConfigDir)
    }
}

/// Get the config file path
pub fn config_file() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("config.json"))
}

/// Load configuration from disk.
/// A missing file yields the defaults; a malformed one is an error.
pub async fn load_config(path: &Path) -> Result<CoreConfig, StorageError> {
    match fs::read_to_string(path).await {
        Ok(contents) => {
            let config: CoreConfig = serde_json::from_str(&contents)?;
            if config.version > CONFIG_VERSION {
                return Err(StorageError::VersionTooNew {
                    found: config.version,
                    supported: CONFIG_VERSION,
                });
            }
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(CoreConfig::default())
        }
        Err(e) => Err(StorageError::Io(e)),
    }
}

/// Save configuration to disk (temp file + rename)
pub async fn save_config(path: &Path, config: &CoreConfig) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(config)?;

    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(json.as_bytes()).await?;
    file.sync_all().await?;

    fs::rename(&temp_path, path).await?;

    Ok(())
}
