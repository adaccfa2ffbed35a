//! Pull-resource URL scheme
//!
//! `<scheme>://<device>/<absolute path>` is answered with the raw bytes of
//! that file, read with `cat` over the device's cached connection. The whole
//! file is buffered before responding.

use std::sync::Arc;

use http::{Request, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::files::path_utils::shell_quote;
use crate::ssh::{CommandRunner, ConnectionCache};

/// Device name and remote path addressed by a pull URL
#[derive(Debug, PartialEq, Eq)]
pub struct PullTarget {
    pub device: String,
    pub path: String,
}

fn decode(part: &str) -> Result<String> {
    urlencoding::decode(part)
        .map(|s| s.into_owned())
        .map_err(|e| Error::InvalidParams(format!("bad escape in {}: {}", part, e)))
}

pub struct PullHandler {
    scheme: String,
    cache: Arc<ConnectionCache>,
}

impl PullHandler {
    pub fn new(scheme: impl Into<String>, cache: Arc<ConnectionCache>) -> Self {
        Self {
            scheme: scheme.into(),
            cache,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn parse(&self, raw: &str) -> Result<PullTarget> {
        let url = Url::parse(raw).map_err(|e| Error::InvalidParams(format!("{}: {}", raw, e)))?;
        if url.scheme() != self.scheme {
            return Err(Error::InvalidParams(format!(
                "unexpected scheme {}",
                url.scheme()
            )));
        }
        let device = match url.host_str() {
            Some(host) if !host.is_empty() => decode(host)?,
            _ => return Err(Error::InvalidParams(format!("{} has no device", raw))),
        };
        let path = decode(url.path())?;
        if path.is_empty() || path == "/" {
            return Err(Error::InvalidParams(format!("{} has no path", raw)));
        }
        Ok(PullTarget { device, path })
    }

    /// Read the file addressed by `raw`
    pub async fn fetch(&self, raw: &str) -> Result<Vec<u8>> {
        let target = self.parse(raw)?;
        let conn = self.cache.obtain(&target.device).await?;
        let output = conn
            .exec_checked(&format!("cat {}", shell_quote(&target.path)), None)
            .await?;
        debug!(
            "Pulled {} from {} ({} bytes)",
            target.path,
            target.device,
            output.stdout.len()
        );
        Ok(output.stdout)
    }

    /// URI-scheme handler: 200 with the file, 404 on any failure.
    ///
    /// `http::Uri` rejects percent escapes in the authority, so a request can
    /// only name devices whose names are valid plain hosts. Use `fetch` with
    /// the raw URL for any other name.
    pub async fn handle(&self, request: Request<Vec<u8>>) -> Response<Vec<u8>> {
        let uri = request.uri().to_string();
        match self.fetch(&uri).await {
            Ok(data) => Response::new(data),
            Err(e) => {
                warn!("Pull of {} failed: {}", uri, e);
                let mut response = Response::new(e.to_string().into_bytes());
                *response.status_mut() = StatusCode::NOT_FOUND;
                response
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceDescriptor, DeviceResolver, StaticRegistry};
    use crate::ssh::{Connection, Connector, HandleController};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct CountingConnector {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self, device: &DeviceDescriptor) -> Result<Connection> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let (tx, _) = mpsc::channel(1);
            Ok(Connection::new(
                "c".into(),
                device.name.clone(),
                HandleController::new(tx),
            ))
        }
    }

    fn handler(connector: Arc<CountingConnector>) -> PullHandler {
        let device = |name: &str| DeviceDescriptor {
            name: name.into(),
            host: "10.0.0.9".into(),
            port: 9922,
            username: "prisoner".into(),
            private_key: None,
            passphrase: None,
            password: None,
        };
        let registry = StaticRegistry::new(vec![device("living room"), device("tv")]);
        let cache = ConnectionCache::new(DeviceResolver::new(Arc::new(registry)), connector);
        PullHandler::new("devmgr-pull", Arc::new(cache))
    }

    #[test]
    fn test_parse_decodes_host_and_path() {
        let h = handler(Arc::default());
        let target = h
            .parse("devmgr-pull://living%20room/media/developer/my%20icon.png")
            .unwrap();
        assert_eq!(
            target,
            PullTarget {
                device: "living room".into(),
                path: "/media/developer/my icon.png".into(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_urls() {
        let h = handler(Arc::default());
        assert!(h.parse("http://tv/etc/hosts").is_err());
        assert!(h.parse("devmgr-pull://tv").is_err());
        assert!(h.parse("not a url").is_err());
    }

    #[tokio::test]
    async fn test_unknown_device_is_not_found() {
        let connector = Arc::new(CountingConnector::default());
        let h = handler(connector.clone());

        let request = Request::builder()
            .uri("devmgr-pull://unknown-device/etc/hosts")
            .body(Vec::new())
            .unwrap();
        let response = h.handle(request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exec_failure_is_not_found() {
        let connector = Arc::new(CountingConnector::default());
        let h = handler(connector.clone());

        let request = Request::builder()
            .uri("devmgr-pull://tv/etc/hosts")
            .body(Vec::new())
            .unwrap();
        let response = h.handle(request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_resolves_encoded_device_name() {
        let connector = Arc::new(CountingConnector::default());
        let h = handler(connector.clone());

        // The connection is dead, so the exec fails after the lookup succeeds
        let err = h
            .fetch("devmgr-pull://living%20room/etc/hosts")
            .await
            .unwrap_err();
        assert_ne!(err.kind(), crate::error::ErrorKind::DeviceNotFound);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }
}
