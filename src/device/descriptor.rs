//! Device descriptor exchange format

use serde::{Deserialize, Serialize};

/// Connection and authentication descriptor of one device.
///
/// Immutable once resolved; a fresh copy is resolved for every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Device identity, also used as the connection cache key
    pub name: String,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub username: String,

    /// OpenSSH/PEM encoded private key content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// The credential actually used to authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials<'a> {
    Key {
        key: &'a str,
        passphrase: Option<&'a str>,
    },
    Password(&'a str),
    None,
}

impl DeviceDescriptor {
    /// Private key wins over password when both are present.
    /// An empty passphrase means "unencrypted key".
    pub fn credentials(&self) -> Credentials<'_> {
        if let Some(key) = self.private_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Credentials::Key {
                key,
                passphrase: self.passphrase.as_deref().filter(|p| !p.is_empty()),
            };
        }
        match self.password.as_deref() {
            Some(password) => Credentials::Password(password),
            None => Credentials::None,
        }
    }
}

fn default_port() -> u16 {
    22
}
