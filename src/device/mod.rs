//! Device module - resolves device descriptors from the device registry
//!
//! The registry itself (the persisted device list) is an external
//! collaborator; this module only reads it.

mod descriptor;
mod resolver;

pub use descriptor::{Credentials, DeviceDescriptor};
pub use resolver::{DeviceRegistry, DeviceResolver, FileRegistry, StaticRegistry};
