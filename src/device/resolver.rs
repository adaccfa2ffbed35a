//! Device resolution
//!
//! Every lookup reloads the registry so callers always see the latest
//! device list; nothing is cached between calls.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::descriptor::DeviceDescriptor;
use crate::error::{Error, Result};

/// Source of device descriptors (the persisted device list)
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn load(&self) -> Result<Vec<DeviceDescriptor>>;
}

/// In-memory registry, for embedding and tests
#[derive(Default)]
pub struct StaticRegistry {
    devices: RwLock<Vec<DeviceDescriptor>>,
}

impl StaticRegistry {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices: RwLock::new(devices),
        }
    }

    /// Replace the device list
    pub fn replace(&self, devices: Vec<DeviceDescriptor>) {
        *self.devices.write() = devices;
    }
}

#[async_trait]
impl DeviceRegistry for StaticRegistry {
    async fn load(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(self.devices.read().clone())
    }
}

/// Read-only registry backed by a JSON array of descriptors
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DeviceRegistry for FileRegistry {
    async fn load(&self) -> Result<Vec<DeviceDescriptor>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Looks up a device descriptor by name
#[derive(Clone)]
pub struct DeviceResolver {
    registry: Arc<dyn DeviceRegistry>,
}

impl DeviceResolver {
    pub fn new(registry: Arc<dyn DeviceRegistry>) -> Self {
        Self { registry }
    }

    pub async fn resolve(&self, name: &str) -> Result<DeviceDescriptor> {
        let devices = self.registry.load().await?;
        let device = devices
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))?;
        debug!("Resolved device {} -> {}:{}", name, device.host, device.port);
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn device(name: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            name: name.to_string(),
            host: "127.0.0.1".to_string(),
            port: 22,
            username: "root".to_string(),
            private_key: None,
            passphrase: None,
            password: Some("alpine".to_string()),
        }
    }

    #[tokio::test]
    async fn test_resolve_found() {
        let resolver = DeviceResolver::new(Arc::new(StaticRegistry::new(vec![
            device("tv1"),
            device("tv2"),
        ])));
        let found = resolver.resolve("tv2").await.unwrap();
        assert_eq!(found.name, "tv2");
    }

    #[tokio::test]
    async fn test_resolve_missing() {
        let resolver = DeviceResolver::new(Arc::new(StaticRegistry::new(vec![device("tv1")])));
        let err = resolver.resolve("tv9").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
    }

    #[tokio::test]
    async fn test_resolve_sees_registry_updates() {
        let registry = Arc::new(StaticRegistry::new(vec![]));
        let resolver = DeviceResolver::new(registry.clone());
        assert!(resolver.resolve("tv1").await.is_err());

        registry.replace(vec![device("tv1")]);
        assert!(resolver.resolve("tv1").await.is_ok());
    }

    #[tokio::test]
    async fn test_file_registry() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("devices.json");
        let resolver = DeviceResolver::new(Arc::new(FileRegistry::new(&path)));

        // Missing file behaves like an empty registry
        assert_eq!(
            resolver.resolve("tv").await.unwrap_err().kind(),
            ErrorKind::DeviceNotFound
        );

        tokio::fs::write(
            &path,
            r#"[{"name":"tv","host":"10.0.0.5","port":9922,"username":"prisoner","password":"x"}]"#,
        )
        .await
        .unwrap();
        let found = resolver.resolve("tv").await.unwrap();
        assert_eq!(found.port, 9922);
    }
}
