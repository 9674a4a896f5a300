//! Network boundary for SKIRMISH.
//!
//! Single ingress/egress point for turn, phase, board and order events:
//! origin/timestamp tagging, self-echo suppression, snapshot staleness,
//! and reconnection with exponential backoff.

pub mod channel;
pub mod error;
pub mod reconnect;
pub mod relay;
pub mod transport;

pub use skirmish_core as core;
pub use channel::{ChannelInput, ChannelSignal, DropReason, IntentSender, SyncChannel};
pub use error::SyncError;
pub use reconnect::ReconnectPolicy;
pub use relay::{LocalRelay, RelayEndpoint};
pub use transport::{Transport, TransportError, TransportEvent};
