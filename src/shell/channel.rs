//! Shell channel plumbing
//!
//! A task owns the russh channel. The session talks to it through two
//! queues: commands in, events out. Events arrive in channel order and end
//! with exactly one `Closed`.

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ShellConfig;
use crate::error::{Error, Result};
use crate::ssh::{Connection, SshError};

/// Requests for the channel task
#[derive(Debug, PartialEq)]
pub enum ChannelCommand {
    Data(Vec<u8>),
    Resize {
        rows: u16,
        cols: u16,
        height_px: u32,
        width_px: u32,
    },
    Close,
}

/// Output of the channel task (stdout and stderr are merged)
#[derive(Debug, PartialEq)]
pub enum ChannelEvent {
    Data(Vec<u8>),
    Closed,
}

/// Command and event queues of a running channel task
pub type ShellChannel = (mpsc::Sender<ChannelCommand>, mpsc::Receiver<ChannelEvent>);

/// Starts shell channels; `label` names the channel task in logs
#[async_trait]
pub trait ShellOpener: Send + Sync {
    /// Shell on a pseudo-terminal, `CapabilityUnavailable` if refused
    async fn open_pty(&self, config: &ShellConfig, label: &str) -> Result<ShellChannel>;

    /// Plain `sh` without a pseudo-terminal
    async fn open_plain(&self, label: &str) -> Result<ShellChannel>;
}

#[async_trait]
impl ShellOpener for Connection {
    async fn open_pty(&self, config: &ShellConfig, label: &str) -> Result<ShellChannel> {
        let channel = open_pty_shell(self, config).await?;
        Ok(spawn_channel_task(channel, label.to_string()))
    }

    async fn open_plain(&self, label: &str) -> Result<ShellChannel> {
        let channel = open_plain_shell(self).await?;
        Ok(spawn_channel_task(channel, label.to_string()))
    }
}

/// Wait for the reply to a `want_reply` request
async fn wait_reply(channel: &mut Channel<Msg>) -> Result<bool> {
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Success => return Ok(true),
            ChannelMsg::Failure => return Ok(false),
            _ => {}
        }
    }
    Err(SshError::ChannelError("channel closed before reply".to_string()).into())
}

/// Interactive shell on a pseudo-terminal
pub async fn open_pty_shell(conn: &Connection, config: &ShellConfig) -> Result<Channel<Msg>> {
    let mut channel = conn.open_channel().await?;
    channel
        .request_pty(
            true,
            &config.term,
            u32::from(config.cols),
            u32::from(config.rows),
            0,
            0,
            &[],
        )
        .await
        .map_err(SshError::from)?;
    if !wait_reply(&mut channel).await? {
        let _ = channel.close().await;
        return Err(Error::CapabilityUnavailable("pty request denied".to_string()));
    }

    channel.request_shell(true).await.map_err(SshError::from)?;
    if !wait_reply(&mut channel).await? {
        let _ = channel.close().await;
        return Err(Error::CapabilityUnavailable("shell request denied".to_string()));
    }
    Ok(channel)
}

/// Plain `sh` without a pseudo-terminal
pub async fn open_plain_shell(conn: &Connection) -> Result<Channel<Msg>> {
    let mut channel = conn.open_channel().await?;
    channel.exec(true, "sh").await.map_err(SshError::from)?;
    if !wait_reply(&mut channel).await? {
        let _ = channel.close().await;
        return Err(SshError::ChannelError("exec sh denied".to_string()).into());
    }
    Ok(channel)
}

/// Spawn the task owning `channel`
pub fn spawn_channel_task(
    mut channel: Channel<Msg>,
    label: String,
) -> (mpsc::Sender<ChannelCommand>, mpsc::Receiver<ChannelEvent>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ChannelCommand>(256);
    let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(256);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(ChannelCommand::Data(data)) => {
                        if let Err(e) = channel.data(&data[..]).await {
                            warn!("Shell {} write failed: {}", label, e);
                            break;
                        }
                    }
                    Some(ChannelCommand::Resize { rows, cols, height_px, width_px }) => {
                        if let Err(e) = channel
                            .window_change(u32::from(cols), u32::from(rows), width_px, height_px)
                            .await
                        {
                            warn!("Shell {} resize failed: {}", label, e);
                        }
                    }
                    Some(ChannelCommand::Close) | None => {
                        let _ = channel.eof().await;
                        let _ = channel.close().await;
                        break;
                    }
                },
                msg = channel.wait() => match msg {
                    Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                        if event_tx.send(ChannelEvent::Data(data.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        debug!("Shell {} exited with {}", label, exit_status);
                    }
                    Some(ChannelMsg::Eof) => debug!("Shell {} EOF", label),
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => {}
                },
            }
        }

        info!("Shell channel {} closed", label);
        let _ = event_tx.send(ChannelEvent::Closed).await;
    });

    (cmd_tx, event_rx)
}
