//! Live authenticated connection to a device
//!
//! A `Connection` is a cheap handle over the owner task's controller. Clones
//! share the same transport; which component owns the lifecycle (cache entry
//! or a single session) is decided by whoever created it.

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tracing::debug;

use super::error::SshError;
use super::handle_owner::HandleController;
use crate::error::{Error, Result};

/// Exit code reported when the remote side closes without an exit status
const MISSING_EXIT_STATUS: u32 = 255;

/// Collected output of one non-interactive remote command
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: Option<u32>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Runs one remote command without a pseudo-terminal
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command`, feeding `stdin` (then EOF) and buffering all output
    async fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<ExecOutput>;

    /// Like `exec`, but a non-zero exit is a `RemoteCommandFailure`
    async fn exec_checked(&self, command: &str, stdin: Option<&[u8]>) -> Result<ExecOutput> {
        let output = self.exec(command, stdin).await?;
        if output.success() {
            return Ok(output);
        }
        Err(Error::RemoteCommand {
            command: command.to_string(),
            exit_code: output.exit_status.unwrap_or(MISSING_EXIT_STATUS),
            stderr: output.stderr_string().trim_end().to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Connection {
    id: String,
    device: String,
    controller: HandleController,
}

impl Connection {
    pub fn new(id: String, device: String, controller: HandleController) -> Self {
        Self {
            id,
            device,
            controller,
        }
    }

    /// Unique id of the underlying transport
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the device this connection was opened for
    pub fn device(&self) -> &str {
        &self.device
    }

    pub async fn open_channel(&self) -> std::result::Result<Channel<Msg>, SshError> {
        self.controller.open_session_channel().await
    }

    /// Resolves once the transport is gone (closed locally, by the peer, or on error)
    pub async fn closed(&self) {
        self.controller.closed().await
    }

    pub fn is_closed(&self) -> bool {
        !self.controller.is_connected()
    }

    /// Tear down the transport. Channels opened on it are closed with it.
    pub async fn close(&self) {
        debug!("Closing connection {} to {}", self.id, self.device);
        self.controller.disconnect().await;
    }
}

#[async_trait]
impl CommandRunner for Connection {
    async fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<ExecOutput> {
        let mut channel = self.open_channel().await?;
        channel
            .exec(true, command)
            .await
            .map_err(SshError::from)?;

        if let Some(input) = stdin {
            channel.data(input).await.map_err(SshError::from)?;
        }
        channel.eof().await.map_err(SshError::from)?;

        let mut output = ExecOutput::default();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => {
                    output.stderr.extend_from_slice(&data)
                }
                ChannelMsg::ExitStatus { exit_status } => output.exit_status = Some(exit_status),
                ChannelMsg::Failure => {
                    return Err(SshError::ChannelError(format!(
                        "exec request denied: {}",
                        command
                    ))
                    .into());
                }
                _ => {}
            }
        }

        debug!(
            "exec on {} finished with {:?} ({} bytes)",
            self.device,
            output.exit_status,
            output.stdout.len()
        );
        Ok(output)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;

    /// Scripted command runner recording every invocation
    #[derive(Default)]
    pub(crate) struct FakeRunner {
        pub calls: Mutex<Vec<(String, Option<Vec<u8>>)>>,
        pub replies: Mutex<VecDeque<ExecOutput>>,
    }

    impl FakeRunner {
        pub fn reply(&self, stdout: &str, exit_status: u32) {
            self.replies.lock().push_back(ExecOutput {
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
                exit_status: Some(exit_status),
            });
        }

        pub fn reply_err(&self, stderr: &str, exit_status: u32) {
            self.replies.lock().push_back(ExecOutput {
                stdout: Vec::new(),
                stderr: stderr.as_bytes().to_vec(),
                exit_status: Some(exit_status),
            });
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<ExecOutput> {
            self.calls
                .lock()
                .push((command.to_string(), stdin.map(|s| s.to_vec())));
            Ok(self.replies.lock().pop_front().unwrap_or_else(|| ExecOutput {
                exit_status: Some(0),
                ..Default::default()
            }))
        }
    }

    #[tokio::test]
    async fn test_exec_checked_maps_exit_status() {
        let runner = FakeRunner::default();
        runner.reply_err("rm: can't remove '/x': Permission denied\n", 1);

        let err = runner.exec_checked("rm /x", None).await.unwrap_err();
        match err {
            Error::RemoteCommand {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "rm: can't remove '/x': Permission denied");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exec_on_closed_connection() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let conn = Connection::new("c1".into(), "tv".into(), HandleController::new(tx));

        assert!(conn.is_closed());
        let err = conn.exec("true", None).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConnectivityFailure);
    }

    #[test]
    fn test_debug_names_device() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new("c1".into(), "tv".into(), HandleController::new(tx));
        let shown = format!("{conn:?}");
        assert!(shown.contains("c1"));
        assert!(shown.contains("tv"));
    }
}
