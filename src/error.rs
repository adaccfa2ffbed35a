//! Crate error taxonomy
//!
//! Every fallible operation of the transport/session core resolves to one of
//! these kinds. `CapabilityUnavailable` is produced internally by the native
//! file-transfer probe and is always recovered by the fallback strategy.

use serde::Serialize;
use thiserror::Error;

use crate::ssh::SshError;

/// Coarse error classification exposed to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    DeviceNotFound,
    AuthenticationFailure,
    ConnectivityFailure,
    CapabilityUnavailable,
    NoSuchSession,
    NotADirectory,
    IsADirectory,
    RemoteCommandFailure,
    TransferFailure,
    SftpFailure,
    InvalidRequest,
    Internal,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Device {0} not found")]
    DeviceNotFound(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Connection failed: {0}")]
    Connectivity(String),

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("No such session {0}")]
    NoSuchSession(String),

    #[error("{0} is not a directory")]
    NotADirectory(String),

    #[error("{0} is a directory")]
    IsADirectory(String),

    #[error("Command `{command}` exited with status {exit_code}: {stderr}")]
    RemoteCommand {
        command: String,
        exit_code: u32,
        stderr: String,
    },

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("SFTP error: {0}")]
    Sftp(String),

    #[error("Unknown method {0}")]
    UnknownMethod(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
            Error::Authentication(_) => ErrorKind::AuthenticationFailure,
            Error::Connectivity(_) => ErrorKind::ConnectivityFailure,
            Error::CapabilityUnavailable(_) => ErrorKind::CapabilityUnavailable,
            Error::NoSuchSession(_) => ErrorKind::NoSuchSession,
            Error::NotADirectory(_) => ErrorKind::NotADirectory,
            Error::IsADirectory(_) => ErrorKind::IsADirectory,
            Error::RemoteCommand { .. } => ErrorKind::RemoteCommandFailure,
            Error::Transfer(_) => ErrorKind::TransferFailure,
            Error::Sftp(_) => ErrorKind::SftpFailure,
            Error::UnknownMethod(_) | Error::InvalidParams(_) => ErrorKind::InvalidRequest,
            Error::Config(_) | Error::Io(_) | Error::Json(_) => ErrorKind::Internal,
        }
    }
}

impl From<SshError> for Error {
    fn from(err: SshError) -> Self {
        match err {
            SshError::AuthenticationFailed(msg) | SshError::KeyError(msg) => {
                Error::Authentication(msg)
            }
            other => Error::Connectivity(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// Serialized as {kind, message} for the command surface
impl Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Error", 2)?;
        state.serialize_field("kind", &self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_errors_map_to_taxonomy() {
        let auth: Error = SshError::AuthenticationFailed("bad password".into()).into();
        assert_eq!(auth.kind(), ErrorKind::AuthenticationFailure);

        let key: Error = SshError::KeyError("bad passphrase".into()).into();
        assert_eq!(key.kind(), ErrorKind::AuthenticationFailure);

        let refused: Error = SshError::ConnectionFailed("refused".into()).into();
        assert_eq!(refused.kind(), ErrorKind::ConnectivityFailure);

        let timeout: Error = SshError::Timeout("connect".into()).into();
        assert_eq!(timeout.kind(), ErrorKind::ConnectivityFailure);
    }

    #[test]
    fn test_serialize_kind_and_message() {
        let err = Error::IsADirectory("/media/developer".into());
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "IsADirectory");
        assert_eq!(value["message"], "/media/developer is a directory");
    }
}
