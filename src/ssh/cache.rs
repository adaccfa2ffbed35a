//! Per-device connection cache used by the pull-resource path
//!
//! At most one live connection per device key. `obtain` calls for the same
//! key are serialized through a per-key async mutex so a burst of requests
//! produces a single connect attempt; different keys never wait on each other.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::client::SshClient;
use super::connection::Connection;
use crate::device::{DeviceDescriptor, DeviceResolver};
use crate::error::Result;

/// Opens authenticated connections (the connection factory seam)
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, device: &DeviceDescriptor) -> Result<Connection>;
}

/// Real connector backed by russh
pub struct SshConnector {
    timeout: Duration,
}

impl SshConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, device: &DeviceDescriptor) -> Result<Connection> {
        match SshClient::new(device.clone(), self.timeout).connect().await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                warn!("Failed to connect to {}: {}", device.name, e);
                Err(e.into())
            }
        }
    }
}

pub struct ConnectionCache {
    resolver: DeviceResolver,
    connector: Arc<dyn Connector>,
    entries: Arc<DashMap<String, Connection>>,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl ConnectionCache {
    pub fn new(resolver: DeviceResolver, connector: Arc<dyn Connector>) -> Self {
        Self {
            resolver,
            connector,
            entries: Arc::new(DashMap::new()),
            locks: DashMap::new(),
        }
    }

    /// Return the cached connection for `device`, connecting on a miss
    pub async fn obtain(&self, device: &str) -> Result<Connection> {
        let lock = self
            .locks
            .entry(device.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let guard = lock.lock().await;
        let result = self.obtain_locked(device).await;
        drop(guard);

        if result.is_err() {
            // Unknown or unreachable names must not pin a mutex forever.
            // The map and `lock` are the only owners unless someone is queued.
            self.locks
                .remove_if(device, |_, l| Arc::ptr_eq(l, &lock) && Arc::strong_count(l) == 2);
        }
        result
    }

    async fn obtain_locked(&self, device: &str) -> Result<Connection> {
        if let Some(conn) = self.entries.get(device).map(|e| e.value().clone()) {
            if !conn.is_closed() {
                debug!("Connection cache hit for {}", device);
                return Ok(conn);
            }
            self.entries.remove_if(device, |_, c| c.id() == conn.id());
        }

        debug!("Connection cache miss for {}", device);
        let descriptor = self.resolver.resolve(device).await?;
        let conn = self.connector.connect(&descriptor).await?;
        info!("Cached connection {} for {}", conn.id(), device);

        self.entries.insert(device.to_string(), conn.clone());
        self.spawn_eviction(device.to_string(), conn.clone());
        Ok(conn)
    }

    fn spawn_eviction(&self, key: String, conn: Connection) {
        let entries = self.entries.clone();
        tokio::spawn(async move {
            conn.closed().await;
            // A newer connection may already occupy the slot
            if entries.remove_if(&key, |_, c| c.id() == conn.id()).is_some() {
                info!("Evicted closed connection {} for {}", conn.id(), key);
            }
        });
    }

    pub fn contains(&self, device: &str) -> bool {
        self.entries.contains_key(device)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Disconnect and forget every cached connection
    pub async fn close_all(&self) {
        let conns: Vec<Connection> = self.entries.iter().map(|e| e.value().clone()).collect();
        self.entries.clear();
        for conn in conns {
            conn.close().await;
        }
    }
}
