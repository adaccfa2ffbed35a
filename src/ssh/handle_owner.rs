//! Handle Owner Task
//!
//! This module implements the "single owner" pattern for SSH Handle.
//!
//! # Architecture
//!
//! Only one task owns the `Handle<ClientHandler>`. All other components
//! communicate with it via `HandleController` which sends commands through
//! an mpsc channel. The task exits when asked to disconnect, when every
//! controller is dropped, or when the transport reports it closed. Once it
//! exits the command channel is closed, which is what `closed()` observes.
//!
//! ```ignore
//! let controller = spawn_handle_owner_task(handle, connection_id, closed_rx);
//! let channel = controller.open_session_channel().await?;
//! ```

use russh::client::{Handle, Msg};
use russh::Channel;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

use super::client::ClientHandler;
use super::error::SshError;

/// Commands sent to the Handle Owner Task
pub enum HandleCommand {
    /// Open a session channel (exec, shell, subsystem)
    ChannelOpenSession {
        reply_tx: oneshot::Sender<Result<Channel<Msg>, russh::Error>>,
    },

    /// Disconnect the SSH connection
    Disconnect,
}

/// Controller for sending commands to the Handle Owner Task
///
/// Cloning only copies the sender; every clone has full control over the
/// connection, including disconnecting it.
#[derive(Debug, Clone)]
pub struct HandleController {
    cmd_tx: mpsc::Sender<HandleCommand>,
}

impl HandleController {
    /// Create a new HandleController with the given sender
    ///
    /// This is primarily used for testing. In production, use `spawn_handle_owner_task`.
    pub fn new(cmd_tx: mpsc::Sender<HandleCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Open a session channel
    pub async fn open_session_channel(&self) -> Result<Channel<Msg>, SshError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(HandleCommand::ChannelOpenSession { reply_tx })
            .await
            .map_err(|_| SshError::Disconnected)?;
        reply_rx
            .await
            .map_err(|_| SshError::Disconnected)?
            .map_err(|e| SshError::ChannelError(e.to_string()))
    }

    /// Disconnect the SSH connection
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(HandleCommand::Disconnect).await;
    }

    /// Resolves once the owner task has stopped accepting commands
    pub async fn closed(&self) {
        self.cmd_tx.closed().await
    }

    /// Check if the Handle Owner Task is still running
    pub fn is_connected(&self) -> bool {
        !self.cmd_tx.is_closed()
    }
}

/// Spawn the Handle Owner Task
///
/// Consumes ownership of the Handle and returns a HandleController for sending commands.
/// `transport_closed` flips to `true` (or loses its sender) when russh reports the
/// connection gone.
pub fn spawn_handle_owner_task(
    handle: Handle<ClientHandler>,
    connection_id: String,
    mut transport_closed: watch::Receiver<bool>,
) -> HandleController {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<HandleCommand>(64);

    tokio::spawn(async move {
        let handle = handle; // Move into task, becomes sole owner

        info!("Handle owner task started for connection {}", connection_id);

        let mut transport_alive = true;
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(HandleCommand::ChannelOpenSession { reply_tx }) => {
                        let result = handle.channel_open_session().await;
                        if reply_tx.send(result).is_err() {
                            warn!("Caller dropped before receiving channel_open_session result");
                        }
                    }
                    Some(HandleCommand::Disconnect) => {
                        info!("Disconnect requested for connection {}", connection_id);
                        break;
                    }
                    None => {
                        info!("All controllers dropped for connection {}", connection_id);
                        break;
                    }
                },
                _ = transport_gone(&mut transport_closed) => {
                    info!("Transport closed for connection {}", connection_id);
                    transport_alive = false;
                    break;
                }
            }
        }

        drain_pending_commands(&mut cmd_rx);

        if transport_alive {
            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "Session closed", "en")
                .await;
        }
        info!("Handle owner task terminated for connection {}", connection_id);
    });

    HandleController { cmd_tx }
}

/// Resolves once the transport reports closed or its handler is dropped.
///
/// The watch read guard is released here, so nothing borrowed from the
/// watch is held across the owner task's awaits.
async fn transport_gone(transport_closed: &mut watch::Receiver<bool>) {
    let _ = transport_closed.wait_for(|closed| *closed).await;
}

/// Drain all pending commands, returning Disconnected error to each
fn drain_pending_commands(cmd_rx: &mut mpsc::Receiver<HandleCommand>) {
    // Close receiver first, prevent new messages
    cmd_rx.close();

    while let Ok(cmd) = cmd_rx.try_recv() {
        match cmd {
            HandleCommand::ChannelOpenSession { reply_tx } => {
                let _ = reply_tx.send(Err(russh::Error::Disconnect));
            }
            HandleCommand::Disconnect => {}
        }
    }
}
