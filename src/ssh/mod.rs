//! SSH module - device connections over russh
//!
//! # Features
//! - Connection factory with key, password or `none` authentication
//! - Single-owner handle task (see `handle_owner`)
//! - Buffered remote exec without a pseudo-terminal
//! - Per-device connection cache for the pull-resource path

mod cache;
mod client;
mod connection;
mod error;
mod handle_owner;

pub use cache::{ConnectionCache, Connector, SshConnector};
pub use client::{ClientHandler, SshClient};
pub use connection::{CommandRunner, Connection, ExecOutput};
pub use error::SshError;
pub use handle_owner::{spawn_handle_owner_task, HandleCommand, HandleController};

#[cfg(test)]
pub(crate) use connection::tests::FakeRunner;
