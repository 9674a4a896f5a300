//! Seam between the sync channel and the socket library.

use async_trait::async_trait;
use thiserror::Error;

use skirmish_core::events::SyncEnvelope;

/// Everything a transport delivers to the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// First successful connection.
    Connected,
    /// Connection restored after a drop.
    Reconnected,
    /// Connection lost.
    Disconnected { reason: String },
    /// A connection attempt failed.
    ConnectError { message: String },
    /// Inbound envelope from the relay.
    Message(SyncEnvelope),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport offline")]
    Offline,

    #[error("relay closed")]
    Closed,

    #[error("wire encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A bidirectional event transport.
///
/// Inbound traffic and unsolicited lifecycle changes (`Disconnected`) are pushed
/// into the event queue the transport was attached to. Results of `connect`
/// are returned to the caller, which turns them into lifecycle events.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn emit(&self, envelope: &SyncEnvelope) -> Result<(), TransportError>;
}
