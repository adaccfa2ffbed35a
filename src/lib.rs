//! devmgr - transport and session core for remote TV device management
//!
//! SSH connections to devices, file sessions (SFTP or exec fallback),
//! interactive shells (pty or emulated line discipline), and a pull-resource
//! URL scheme, all reachable through one command dispatch table.

pub mod commands;
pub mod config;
pub mod device;
pub mod error;
pub mod files;
pub mod protocol;
pub mod shell;
pub mod ssh;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::CoreConfig;
use device::{DeviceRegistry, DeviceResolver};
use files::FileSessionRegistry;
use protocol::PullHandler;
use shell::{EventSink, ShellSessionRegistry};
use ssh::{ConnectionCache, Connector, SshConnector};

pub use commands::CommandRouter;
pub use error::{Error, ErrorKind, Result};

/// Initialize logging (`RUST_LOG`, default `info`). Safe to call twice.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Services shared by the command surface and the URL scheme handler
pub struct Core {
    pub config: CoreConfig,
    pub resolver: DeviceResolver,
    pub cache: Arc<ConnectionCache>,
    pub files: FileSessionRegistry,
    pub shells: ShellSessionRegistry,
    pub pull: PullHandler,
}

impl Core {
    pub fn new(
        config: CoreConfig,
        registry: Arc<dyn DeviceRegistry>,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        let connector = Arc::new(SshConnector::new(Duration::from_secs(
            config.connect_timeout_secs,
        )));
        Self::with_connector(config, registry, connector, sink)
    }

    pub fn with_connector(
        config: CoreConfig,
        registry: Arc<dyn DeviceRegistry>,
        connector: Arc<dyn Connector>,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        let resolver = DeviceResolver::new(registry);
        let cache = Arc::new(ConnectionCache::new(resolver.clone(), connector.clone()));
        let files = FileSessionRegistry::new(
            resolver.clone(),
            connector.clone(),
            config.probe_path.clone(),
            config.resolved_temp_dir(),
        );
        let shells =
            ShellSessionRegistry::new(resolver.clone(), connector, config.shell.clone(), sink);
        let pull = PullHandler::new(config.pull_scheme.clone(), cache.clone());

        Self {
            config,
            resolver,
            cache,
            files,
            shells,
            pull,
        }
    }

    /// Close every session and cached connection
    pub async fn shutdown(&self) {
        info!(
            "Shutting down: {} file sessions, {} shells, {} cached connections",
            self.files.len(),
            self.shells.len(),
            self.cache.len()
        );
        self.shells.close_all().await;
        self.files.close_all().await;
        self.cache.close_all().await;
    }
}
