//! Remote file sessions
//!
//! Two strategies behind `FileSession`: the SFTP subsystem when the device
//! offers it, and exec helpers otherwise.

mod fallback;
mod native;
pub mod path_utils;
mod registry;
mod session;
mod types;

pub use fallback::FallbackFileSession;
pub use native::{NativeFileSession, RusshSftpBackend, SftpBackend};
pub use registry::FileSessionRegistry;
pub use session::{FileSession, FileStrategy};
pub use types::{Attributes, DirEntry, FileItem, FileType, LinkInfo};
