//! Adapters layer: Concrete implementations of ports.
//!
//! - `lines`: newline-delimited packages from any reader (stdin, files)
//! - `channel`: in-process channel fed by another thread
//! - `sanitize`: secret filtering for logs

pub mod channel;
pub mod lines;
pub mod sanitize;

pub use channel::{channel, ChannelError, ChannelPublisher, ChannelSource};
pub use lines::{LineSource, LineSourceError};
