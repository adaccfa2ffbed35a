//! File Session Registry
//!
//! Token → session map. Every session gets its own connection, opened here
//! and torn down on close.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use super::session::FileSession;
use crate::device::DeviceResolver;
use crate::error::{Error, Result};
use crate::ssh::Connector;

pub struct FileSessionRegistry {
    resolver: DeviceResolver,
    connector: Arc<dyn Connector>,
    probe_path: String,
    temp_dir: PathBuf,
    sessions: DashMap<String, Arc<FileSession>>,
}

impl FileSessionRegistry {
    pub fn new(
        resolver: DeviceResolver,
        connector: Arc<dyn Connector>,
        probe_path: String,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            resolver,
            connector,
            probe_path,
            temp_dir,
            sessions: DashMap::new(),
        }
    }

    /// Open a file session on `device` and return its token
    pub async fn open(&self, device: &str) -> Result<String> {
        let descriptor = self.resolver.resolve(device).await?;
        let conn = self.connector.connect(&descriptor).await?;
        let opened =
            FileSession::open(conn.clone(), &self.probe_path, self.temp_dir.clone()).await;
        match opened {
            Ok(session) => Ok(self.insert(session)),
            Err(e) => {
                conn.close().await;
                Err(e)
            }
        }
    }

    /// Register an opened session under a fresh token
    pub fn insert(&self, session: FileSession) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let device = session.device().to_string();
        self.sessions.insert(token.clone(), Arc::new(session));
        info!(
            "Opened file session {} on {}, total sessions: {}",
            token,
            device,
            self.sessions.len()
        );
        token
    }

    /// Look up a live session
    pub fn get(&self, token: &str) -> Result<Arc<FileSession>> {
        self.sessions
            .get(token)
            .map(|s| s.value().clone())
            .ok_or_else(|| Error::NoSuchSession(token.to_string()))
    }

    pub async fn close(&self, token: &str) -> Result<()> {
        let (_, session) = self
            .sessions
            .remove(token)
            .ok_or_else(|| Error::NoSuchSession(token.to_string()))?;
        session.end().await;
        info!("Closed file session {}", token);
        Ok(())
    }

    pub async fn close_all(&self) {
        let tokens: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for token in tokens {
            let _ = self.close(&token).await;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceDescriptor, StaticRegistry};
    use crate::error::ErrorKind;
    use crate::files::{FallbackFileSession, FileStrategy};
    use crate::ssh::{Connection, FakeRunner, HandleController};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Hands out connections whose owner task is already gone
    struct DeadConnector;

    #[async_trait]
    impl Connector for DeadConnector {
        async fn connect(&self, device: &DeviceDescriptor) -> Result<Connection> {
            let (tx, _) = mpsc::channel(1);
            Ok(Connection::new(
                uuid::Uuid::new_v4().to_string(),
                device.name.clone(),
                HandleController::new(tx),
            ))
        }
    }

    fn registry() -> FileSessionRegistry {
        let devices = StaticRegistry::new(vec![DeviceDescriptor {
            name: "tv".into(),
            host: "10.0.0.3".into(),
            port: 9922,
            username: "prisoner".into(),
            private_key: None,
            passphrase: None,
            password: None,
        }]);
        FileSessionRegistry::new(
            DeviceResolver::new(Arc::new(devices)),
            Arc::new(DeadConnector),
            "/dev/null".into(),
            std::env::temp_dir().join("devmgr-test"),
        )
    }

    fn fallback_session() -> FileSession {
        let strategy = FileStrategy::Fallback(FallbackFileSession::new(Arc::new(
            FakeRunner::default(),
        )));
        FileSession::new("tv".into(), None, strategy, std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_insert_and_close() {
        let registry = registry();
        let token = registry.insert(fallback_session());
        assert_eq!(registry.get(&token).unwrap().device(), "tv");

        registry.close(&token).await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_open_on_dead_connection_registers_nothing() {
        let registry = registry();
        let err = registry.open("tv").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectivityFailure);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stale_token() {
        let registry = registry();
        let token = registry.insert(fallback_session());
        registry.close(&token).await.unwrap();

        assert_eq!(
            registry.get(&token).err().map(|e| e.kind()),
            Some(ErrorKind::NoSuchSession)
        );
        assert_eq!(
            registry.close(&token).await.unwrap_err().kind(),
            ErrorKind::NoSuchSession
        );
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let registry = registry();
        let err = registry.open("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
        assert!(registry.is_empty());
    }
}
