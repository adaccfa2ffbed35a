//! Shell Session Registry
//!
//! Owns every open shell by token, forwards shell output to the
//! presentation layer and drops shells whose channel closes on its own.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::session::{ShellEvent, ShellInfo, ShellSession};
use crate::config::ShellConfig;
use crate::device::DeviceResolver;
use crate::error::{Error, Result};
use crate::ssh::Connector;

pub const EVENT_SHELL_UPDATED: &str = "shell-session/updated";

pub fn data_event(token: &str) -> String {
    format!("shell-session/data.{}", token)
}

pub fn close_event(token: &str) -> String {
    format!("shell-session/close.{}", token)
}

/// Receives shell events for the presentation layer
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: serde_json::Value);
}

type ShellMap = DashMap<String, Arc<ShellSession>>;

/// Length of the prefix of `buf` that does not end inside a UTF-8 sequence
fn utf8_boundary(buf: &[u8]) -> usize {
    let mut i = buf.len();
    while i > 0 && i > buf.len().saturating_sub(4) {
        let byte = buf[i - 1];
        if byte & 0x80 == 0 {
            return i;
        }
        // Continuation byte, keep looking for the lead byte
        if byte & 0xC0 == 0x80 {
            i -= 1;
            continue;
        }
        let char_len = if byte & 0xF8 == 0xF0 {
            4
        } else if byte & 0xF0 == 0xE0 {
            3
        } else if byte & 0xE0 == 0xC0 {
            2
        } else {
            // Invalid lead byte, lossy decoding deals with it
            return buf.len();
        };
        return if buf.len() - (i - 1) >= char_len {
            buf.len()
        } else {
            i - 1
        };
    }
    buf.len()
}

/// Decodes shell output for the sink, holding back a character split
/// across chunks until its remaining bytes arrive
#[derive(Default)]
struct Utf8Decoder {
    remainder: Vec<u8>,
}

impl Utf8Decoder {
    fn push(&mut self, data: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.remainder);
        buf.extend_from_slice(data);
        let safe_end = utf8_boundary(&buf);
        self.remainder = buf.split_off(safe_end);
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn finish(&mut self) -> String {
        String::from_utf8_lossy(&std::mem::take(&mut self.remainder)).into_owned()
    }
}

pub struct ShellSessionRegistry {
    resolver: DeviceResolver,
    connector: Arc<dyn Connector>,
    config: ShellConfig,
    sessions: Arc<ShellMap>,
    sink: Option<Arc<dyn EventSink>>,
}

fn sorted_list(sessions: &ShellMap) -> Vec<ShellInfo> {
    let mut list: Vec<ShellInfo> = sessions.iter().map(|s| s.info()).collect();
    list.sort_by_key(|info| info.created_at);
    list
}

impl ShellSessionRegistry {
    pub fn new(
        resolver: DeviceResolver,
        connector: Arc<dyn Connector>,
        config: ShellConfig,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        Self {
            resolver,
            connector,
            config,
            sessions: Arc::new(DashMap::new()),
            sink,
        }
    }

    /// Open a shell on `device` and return its token
    pub async fn open(&self, device: &str) -> Result<String> {
        let descriptor = self.resolver.resolve(device).await?;
        let conn = self.connector.connect(&descriptor).await?;

        let token = uuid::Uuid::new_v4().to_string();
        let default_title = format!("{}@{}", descriptor.username, descriptor.host);
        let opened =
            ShellSession::open(conn.clone(), token.clone(), default_title, &self.config).await;
        let (session, events) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                conn.close().await;
                return Err(e);
            }
        };

        self.insert(session, events);
        Ok(token)
    }

    /// Register a started session and forward its events
    pub fn insert(&self, session: Arc<ShellSession>, events: broadcast::Receiver<ShellEvent>) {
        let token = session.token().to_string();
        self.sessions.insert(token.clone(), session);
        info!(
            "Registered shell {}, total shells: {}",
            token,
            self.sessions.len()
        );
        self.notify_updated();
        self.spawn_forwarder(token, events);
    }

    fn spawn_forwarder(&self, token: String, mut events: broadcast::Receiver<ShellEvent>) {
        let sessions = self.sessions.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let mut decoder = Utf8Decoder::default();
            loop {
                match events.recv().await {
                    Ok(ShellEvent::Data(data)) => {
                        let text = decoder.push(&data);
                        if let Some(sink) = sink.as_ref().filter(|_| !text.is_empty()) {
                            sink.emit(&data_event(&token), json!(text));
                        }
                    }
                    Ok(ShellEvent::Closed) | Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Shell {} event forwarder lagged by {} events", token, n);
                    }
                }
            }

            let tail = decoder.finish();
            if let Some(sink) = sink.as_ref().filter(|_| !tail.is_empty()) {
                sink.emit(&data_event(&token), json!(tail));
            }

            let removed = sessions.remove(&token).is_some();
            if removed {
                info!("Removed closed shell {}", token);
            }
            if let Some(sink) = &sink {
                sink.emit(&close_event(&token), json!({ "removed": removed }));
                if removed {
                    sink.emit(EVENT_SHELL_UPDATED, json!(sorted_list(&sessions)));
                }
            }
        });
    }

    fn notify_updated(&self) {
        if let Some(sink) = &self.sink {
            sink.emit(EVENT_SHELL_UPDATED, json!(self.list()));
        }
    }

    pub fn get(&self, token: &str) -> Result<Arc<ShellSession>> {
        self.sessions
            .get(token)
            .map(|s| s.value().clone())
            .ok_or_else(|| Error::NoSuchSession(token.to_string()))
    }

    /// Open shells, oldest first
    pub fn list(&self) -> Vec<ShellInfo> {
        sorted_list(&self.sessions)
    }

    pub async fn close(&self, token: &str) -> Result<()> {
        let (_, session) = self
            .sessions
            .remove(token)
            .ok_or_else(|| Error::NoSuchSession(token.to_string()))?;
        session.close().await;
        info!("Closed shell {}", token);
        self.notify_updated();
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
    use crate::device::StaticRegistry;
    use crate::error::ErrorKind;
    use crate::shell::channel::{ChannelCommand, ChannelEvent};
    use crate::shell::session::tests::{harness, serve_until_close};
    use crate::ssh::{Connection, HandleController};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl RecordingSink {
        fn names(&self) -> Vec<String> {
            self.events.lock().iter().map(|(n, _)| n.clone()).collect()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &str, payload: serde_json::Value) {
            self.events.lock().push((event.to_string(), payload));
        }
    }

    struct DeadConnector;

    #[async_trait]
    impl Connector for DeadConnector {
        async fn connect(
            &self,
            device: &crate::device::DeviceDescriptor,
        ) -> Result<Connection> {
            let (tx, _) = mpsc::channel(1);
            Ok(Connection::new(
                "dead".into(),
                device.name.clone(),
                HandleController::new(tx),
            ))
        }
    }

    fn registry(sink: Arc<RecordingSink>) -> ShellSessionRegistry {
        ShellSessionRegistry::new(
            DeviceResolver::new(Arc::new(StaticRegistry::default())),
            Arc::new(DeadConnector),
            ShellConfig::default(),
            Some(sink),
        )
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..100 {
            if cond() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_forwards_data_and_removes_on_remote_close() {
        let sink = Arc::new(RecordingSink::default());
        let registry = registry(sink.clone());
        let h = harness("t1", false);
        registry.insert(h.session.clone(), h.events);
        assert_eq!(registry.list().len(), 1);

        h.remote_tx
            .send(ChannelEvent::Data(b"hi".to_vec()))
            .await
            .unwrap();
        h.remote_tx.send(ChannelEvent::Closed).await.unwrap();

        wait_until(|| registry.is_empty()).await;
        wait_until(|| sink.names().contains(&close_event("t1"))).await;

        let events = sink.events.lock().clone();
        let data = events
            .iter()
            .find(|(n, _)| n == &data_event("t1"))
            .unwrap();
        assert_eq!(data.1, json!("hi"));
        assert_eq!(
            registry.get("t1").err().map(|e| e.kind()),
            Some(ErrorKind::NoSuchSession)
        );
    }

    #[test]
    fn test_utf8_boundary() {
        assert_eq!(utf8_boundary(b"ls -l"), 5);
        assert_eq!(utf8_boundary("目录".as_bytes()), 6);
        assert_eq!(utf8_boundary(&[0xE7, 0x9B, 0xAE, 0xE5, 0xBD]), 3);
        assert_eq!(utf8_boundary(&[0xF0, 0x9F, 0x98]), 0);
    }

    #[tokio::test]
    async fn test_character_split_across_chunks() {
        let sink = Arc::new(RecordingSink::default());
        let registry = registry(sink.clone());
        let h = harness("t1", false);
        registry.insert(h.session.clone(), h.events);

        let bytes = "é".as_bytes();
        h.remote_tx
            .send(ChannelEvent::Data(vec![b'a', bytes[0]]))
            .await
            .unwrap();
        h.remote_tx
            .send(ChannelEvent::Data(vec![bytes[1], b'b']))
            .await
            .unwrap();
        h.remote_tx.send(ChannelEvent::Closed).await.unwrap();

        wait_until(|| sink.names().contains(&close_event("t1"))).await;
        let data: Vec<serde_json::Value> = sink
            .events
            .lock()
            .iter()
            .filter(|(n, _)| n == &data_event("t1"))
            .map(|(_, v)| v.clone())
            .collect();
        assert_eq!(data, vec![json!("a"), json!("éb")]);
    }

    #[tokio::test]
    async fn test_list_sorted_by_creation() {
        let registry = registry(Arc::new(RecordingSink::default()));
        let first = harness("a", false);
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = harness("b", true);
        registry.insert(second.session.clone(), second.events);
        registry.insert(first.session.clone(), first.events);

        let list = registry.list();
        assert_eq!(list[0].token, "a");
        assert_eq!(list[1].token, "b");
        assert!(list[1].dumb);
    }

    #[tokio::test]
    async fn test_close_and_stale_token() {
        let sink = Arc::new(RecordingSink::default());
        let registry = registry(sink.clone());
        let h = harness("t1", false);
        registry.insert(h.session.clone(), h.events);
        let remote = serve_until_close(h.remote_rx, h.remote_tx);

        registry.close("t1").await.unwrap();
        assert_eq!(remote.await.unwrap(), vec![ChannelCommand::Close]);
        assert!(h.session.closed());
        assert!(registry.is_empty());
        assert_eq!(
            registry.close("t1").await.unwrap_err().kind(),
            ErrorKind::NoSuchSession
        );
        assert!(sink.names().contains(&EVENT_SHELL_UPDATED.to_string()));
    }

    #[tokio::test]
    async fn test_open_unknown_device() {
        let registry = registry(Arc::new(RecordingSink::default()));
        let err = registry.open("tv").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
    }
}
