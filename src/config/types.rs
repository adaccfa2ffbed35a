//! Core configuration types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Current config file version
pub const CONFIG_VERSION: u32 = 1;

/// Transport/session layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Config file version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// TCP connect + handshake timeout in seconds.
    /// No other timeout is enforced once a connection is up.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Path stat'ed to decide whether the native file-transfer subsystem works
    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// Override for the temporary download directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Interactive shell defaults
    #[serde(default)]
    pub shell: ShellConfig,

    /// URL scheme served by the pull protocol handler
    #[serde(default = "default_pull_scheme")]
    pub pull_scheme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_rows")]
    pub rows: u16,

    #[serde(default = "default_cols")]
    pub cols: u16,

    /// Lines kept by the headless terminal emulator
    #[serde(default = "default_scrollback")]
    pub scrollback: usize,

    /// TERM requested for the pseudo-terminal
    #[serde(default = "default_term")]
    pub term: String,
}

impl CoreConfig {
    /// Directory used by `download_to_temp`
    pub fn resolved_temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("devmgr"))
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_probe_path() -> String {
    "/dev/null".to_string()
}

fn default_pull_scheme() -> String {
    "devmgr-pull".to_string()
}

fn default_rows() -> u16 {
    24
}

fn default_cols() -> u16 {
    80
}

fn default_scrollback() -> usize {
    1000
}

fn default_term() -> String {
    "xterm-256color".to_string()
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
            scrollback: default_scrollback(),
            term: default_term(),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            connect_timeout_secs: default_connect_timeout(),
            probe_path: default_probe_path(),
            temp_dir: None,
            shell: ShellConfig::default(),
            pull_scheme: default_pull_scheme(),
        }
    }
}
