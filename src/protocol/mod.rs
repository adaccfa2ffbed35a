//! Custom URL scheme handlers

mod pull;

pub use pull::{PullHandler, PullTarget};
