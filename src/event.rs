//! Telemetry events emitted by the core.
//!
//! Delivered over a [`tokio::sync::broadcast`] channel callers can
//! subscribe to via [`crate::handle::ConnectionHandle::events`].

/// A lifecycle event the controller reports about its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The connection dropped while previously `connected`.
    Disconnection { address: String, reason: String },
    /// A connection attempt failed before ever reaching `connected`.
    FailedConnection { address: String, reason: String },
    /// A connection attempt succeeded after at least one backoff wait.
    Reconnected { address: String },
}
