//! Shell sessions
//!
//! A shell is either a real pseudo-terminal shell or a "dumb" one: plain
//! `sh` fed whole lines by the local line discipline. Both keep a headless
//! screen updated with everything shown to subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{info, warn};

use super::channel::{ChannelCommand, ChannelEvent, ShellOpener};
use super::line::LineDiscipline;
use super::screen::Screen;
use crate::config::ShellConfig;
use crate::error::{Error, Result};
use crate::ssh::Connection;

/// Events published to subscribers, `Closed` exactly once and last
#[derive(Debug, Clone, PartialEq)]
pub enum ShellEvent {
    Data(Vec<u8>),
    Closed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellInfo {
    pub token: String,
    pub device: String,
    pub dumb: bool,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

pub struct ShellSession {
    token: String,
    device: String,
    /// Title shown until the remote program sets one
    default_title: String,
    dumb: bool,
    cmd_tx: mpsc::Sender<ChannelCommand>,
    screen: Mutex<Screen>,
    line: Mutex<LineDiscipline>,
    events: broadcast::Sender<ShellEvent>,
    closed: AtomicBool,
    /// Flipped by the pump once the channel task has reported its end
    drained: watch::Sender<bool>,
    connection: Option<Connection>,
    created_at: DateTime<Utc>,
}

/// Rewrite `\n` as `\n\r`; without a pty nothing does it remotely
fn translate_newlines(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8);
    for &b in data {
        out.push(b);
        if b == b'\n' {
            out.push(b'\r');
        }
    }
    out
}

impl ShellSession {
    /// Start a shell on `conn`, which the session then owns.
    ///
    /// A pseudo-terminal is requested first; if the device refuses it, a
    /// plain `sh` on the same connection backs a dumb shell.
    pub async fn open(
        conn: Connection,
        token: String,
        default_title: String,
        config: &ShellConfig,
    ) -> Result<(Arc<Self>, broadcast::Receiver<ShellEvent>)> {
        let device = conn.device().to_string();
        let opener = conn.clone();
        Self::open_on(&opener, device, token, default_title, config, Some(conn)).await
    }

    /// Same as `open`, with channels started by `opener`
    pub async fn open_on(
        opener: &dyn ShellOpener,
        device: String,
        token: String,
        default_title: String,
        config: &ShellConfig,
        connection: Option<Connection>,
    ) -> Result<(Arc<Self>, broadcast::Receiver<ShellEvent>)> {
        let (dumb, (cmd_tx, event_rx)) = match opener.open_pty(config, &token).await {
            Ok(queues) => (false, queues),
            Err(e) => {
                warn!("No pty on {} ({}), falling back to dumb shell", device, e);
                (true, opener.open_plain(&token).await?)
            }
        };

        info!("Shell {} opened on {} (dumb: {})", token, device, dumb);
        Ok(Self::start(
            token,
            device,
            default_title,
            dumb,
            cmd_tx,
            event_rx,
            config,
            connection,
        ))
    }

    /// Wire a session to a channel task's queues and start pumping events.
    ///
    /// The returned receiver is subscribed before any event is published.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        token: String,
        device: String,
        default_title: String,
        dumb: bool,
        cmd_tx: mpsc::Sender<ChannelCommand>,
        mut event_rx: mpsc::Receiver<ChannelEvent>,
        config: &ShellConfig,
        connection: Option<Connection>,
    ) -> (Arc<Self>, broadcast::Receiver<ShellEvent>) {
        let (events, subscriber) = broadcast::channel(256);
        let (drained, _) = watch::channel(false);
        let session = Arc::new(Self {
            token,
            device,
            default_title,
            dumb,
            cmd_tx,
            screen: Mutex::new(Screen::new(config.rows, config.cols, config.scrollback)),
            line: Mutex::new(LineDiscipline::new()),
            events,
            closed: AtomicBool::new(false),
            drained,
            connection,
            created_at: Utc::now(),
        });

        let pump = session.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match event {
                    ChannelEvent::Data(data) => {
                        let data = if pump.dumb {
                            translate_newlines(&data)
                        } else {
                            data
                        };
                        pump.show(data);
                    }
                    ChannelEvent::Closed => break,
                }
            }
            pump.mark_closed();
        });

        (session, subscriber)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn dumb(&self) -> bool {
        self.dumb
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShellEvent> {
        self.events.subscribe()
    }

    pub fn info(&self) -> ShellInfo {
        ShellInfo {
            token: self.token.clone(),
            device: self.device.clone(),
            dumb: self.dumb,
            title: self
                .screen
                .lock()
                .title()
                .unwrap_or_else(|| self.default_title.clone()),
            created_at: self.created_at,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Feed the screen and publish to subscribers
    fn show(&self, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }
        self.screen.lock().process(&data);
        // No receivers is fine
        let _ = self.events.send(ShellEvent::Data(data));
    }

    /// Only the pump calls this, after the last chunk has been shown
    fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Shell {} closed", self.token);
            let _ = self.events.send(ShellEvent::Closed);
        }
        self.drained.send_replace(true);
    }

    async fn send(&self, command: ChannelCommand) -> Result<()> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| Error::Connectivity(format!("shell {} is closed", self.token)))
    }

    pub async fn write(&self, data: &str) -> Result<()> {
        if !self.dumb {
            return self.send(ChannelCommand::Data(data.as_bytes().to_vec())).await;
        }

        let output = self.line.lock().input(data);
        if !output.echo.is_empty() {
            self.show(output.echo.into_bytes());
        }
        if !output.send.is_empty() {
            self.send(ChannelCommand::Data(output.send.into_bytes()))
                .await?;
        }
        Ok(())
    }

    /// Resize the local screen, and the remote pty when there is one
    pub async fn resize(&self, rows: u16, cols: u16, height_px: u32, width_px: u32) -> Result<()> {
        self.screen.lock().resize(rows, cols);
        if self.dumb {
            return Ok(());
        }
        self.send(ChannelCommand::Resize {
            rows,
            cols,
            height_px,
            width_px,
        })
        .await
    }

    /// Currently rendered screen, trailing blank rows removed
    pub fn buffer(&self) -> String {
        self.screen.lock().contents()
    }

    /// Close the channel and the private connection.
    ///
    /// Returns once every chunk the remote sent before closing has been
    /// published, followed by `Closed`.
    pub async fn close(&self) {
        if self.dumb {
            // Interrupt whatever runs in the foreground first
            let _ = self.send(ChannelCommand::Data(b"\x03".to_vec())).await;
        }
        let _ = self.send(ChannelCommand::Close).await;

        let mut drained = self.drained.subscribe();
        let _ = drained.wait_for(|done| *done).await;

        if let Some(conn) = &self.connection {
            conn.close().await;
        }
    }
}
