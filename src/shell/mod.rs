//! Interactive remote shells

mod channel;
mod line;
mod registry;
mod screen;
mod session;

pub use channel::{ChannelCommand, ChannelEvent, ShellChannel, ShellOpener};
pub use line::{LineDiscipline, LineOutput};
pub use registry::{close_event, data_event, EventSink, ShellSessionRegistry, EVENT_SHELL_UPDATED};
pub use screen::Screen;
pub use session::{ShellEvent, ShellInfo, ShellSession};
