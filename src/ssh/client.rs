//! SSH Client implementation using russh
//!
//! Opens one authenticated connection to a device from its descriptor.

use std::sync::Arc;
use std::time::Duration;

use russh::client;
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::PublicKey;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::error::SshError;
use super::handle_owner::spawn_handle_owner_task;
use crate::device::{Credentials, DeviceDescriptor};

/// Connection factory for a single device
pub struct SshClient {
    device: DeviceDescriptor,
    timeout: Duration,
}

impl SshClient {
    pub fn new(device: DeviceDescriptor, timeout: Duration) -> Self {
        Self { device, timeout }
    }

    /// Connect, authenticate and hand the transport over to its owner task
    pub async fn connect(self) -> Result<Connection, SshError> {
        let device = &self.device;
        info!(
            "Connecting to device {} at {}:{}",
            device.name, device.host, device.port
        );

        // Keep-alive probing stays off: idle interactive sessions must survive
        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: None,
            ..Default::default()
        };

        let (closed_tx, closed_rx) = watch::channel(false);
        let handler = ClientHandler::new(device.host.clone(), device.port, closed_tx);

        let mut handle = tokio::time::timeout(
            self.timeout,
            client::connect(
                Arc::new(ssh_config),
                (device.host.as_str(), device.port),
                handler,
            ),
        )
        .await
        .map_err(|_| SshError::Timeout("Connection timed out".to_string()))?
        .map_err(|e| SshError::ConnectionFailed(e.to_string()))?;

        debug!("SSH handshake completed with {}", device.name);

        let authenticated = match device.credentials() {
            Credentials::Key { key, passphrase } => {
                let key = russh::keys::decode_secret_key(key, passphrase)
                    .map_err(|e| SshError::KeyError(e.to_string()))?;
                let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);

                handle
                    .authenticate_publickey(&device.username, key_with_hash)
                    .await
                    .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?
            }
            Credentials::Password(password) => handle
                .authenticate_password(&device.username, password)
                .await
                .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?,
            Credentials::None => handle
                .authenticate_none(&device.username)
                .await
                .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?,
        };

        if !authenticated.success() {
            return Err(SshError::AuthenticationFailed(
                "Authentication rejected by device".to_string(),
            ));
        }

        info!("SSH authentication successful for {}", device.name);

        let connection_id = uuid::Uuid::new_v4().to_string();
        let controller = spawn_handle_owner_task(handle, connection_id.clone(), closed_rx);

        Ok(Connection::new(connection_id, device.name.clone(), controller))
    }
}

/// Client handler for russh callbacks
///
/// Devices regenerate host keys on reflash, so server keys are accepted and
/// only logged. Transport loss is reported through `closed_tx`.
pub struct ClientHandler {
    host: String,
    port: u16,
    closed_tx: watch::Sender<bool>,
}

impl ClientHandler {
    pub fn new(host: String, port: u16, closed_tx: watch::Sender<bool>) -> Self {
        Self {
            host,
            port,
            closed_tx,
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            "Accepting host key for {}:{} ({})",
            self.host,
            self.port,
            server_public_key.fingerprint(Default::default())
        );
        Ok(true)
    }

    async fn disconnected(
        &mut self,
        reason: client::DisconnectReason<Self::Error>,
    ) -> Result<(), Self::Error> {
        let _ = self.closed_tx.send(true);
        match reason {
            client::DisconnectReason::ReceivedDisconnect(info) => {
                info!("{}:{} disconnected: {:?}", self.host, self.port, info);
                Ok(())
            }
            client::DisconnectReason::Error(e) => {
                warn!("{}:{} transport error: {}", self.host, self.port, e);
                Err(e)
            }
        }
    }
}
