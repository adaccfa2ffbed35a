//! Configuration Management Module
//!
//! Handles the core transport/session configuration and its on-disk storage.

pub mod storage;
pub mod types;

pub use storage::{config_dir, config_file, load_config, save_config, StorageError};
pub use types::{CoreConfig, ShellConfig, CONFIG_VERSION};
