//! In-process notification channel.
//!
//! Lets a subscriber thread (a store client, a simulator, a test) feed the
//! consumer loop. Dropping every publisher closes the source.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::ports::{Notification, NotificationSource};

/// Channel failure reported by the publishing side.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Channel error: {0}")]
pub struct ChannelError(pub String);

type Message = Result<Notification, ChannelError>;

/// Create a connected publisher/source pair.
#[must_use]
pub fn channel() -> (ChannelPublisher, ChannelSource) {
    let (tx, rx) = mpsc::channel();
    (ChannelPublisher { tx }, ChannelSource { rx })
}

/// Sending half, cloneable across subscriber threads.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: Sender<Message>,
}

impl ChannelPublisher {
    /// Deliver a notification. Returns `false` once the consumer is gone.
    pub fn publish(&self, notification: Notification) -> bool {
        self.tx.send(Ok(notification)).is_ok()
    }

    /// Report a channel problem (e.g. store unreachable).
    pub fn report_error(&self, message: impl Into<String>) -> bool {
        self.tx.send(Err(ChannelError(message.into()))).is_ok()
    }
}

/// Receiving half, consumed by the monitor loop.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<Message>,
}

impl NotificationSource for ChannelSource {
    type Error = ChannelError;

    fn next_notification(&mut self) -> Option<Result<Notification, Self::Error>> {
        self.rx.recv().ok()
    }
}
