//! Notification port: Trait for the external real-time store.
//!
//! The store is an opaque key-value channel that pushes encrypted packages.
//! Delivery is at-least-once and ordered per ambulance; retries and
//! reconnects are the store's own business.

/// One delivery from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Store path the value was published under (e.g. `encrypted_vitals`)
    pub path: String,

    /// Raw wire package, still encrypted
    pub payload: String,
}

impl Notification {
    #[must_use]
    pub fn new(path: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            payload: payload.into(),
        }
    }
}

/// Trait for subscribing to encrypted vitals.
///
/// The consumer loop pulls one notification at a time and processes it to
/// completion before pulling the next.
pub trait NotificationSource: Send {
    /// Error type for channel failures (store unreachable, read errors).
    type Error: std::error::Error + Send + Sync + 'static;

    /// Block until the next notification arrives.
    ///
    /// # Returns
    /// `None` once the channel is closed for good. `Some(Err(_))` reports a
    /// channel problem; the caller may keep pulling afterwards.
    fn next_notification(&mut self) -> Option<Result<Notification, Self::Error>>;
}
