//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundary
//! between the pipeline and the real-time store that delivers packages.

mod notification;

pub use notification::{Notification, NotificationSource};
