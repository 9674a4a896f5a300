use thiserror::Error;

use skirmish_core::enums::ConnectionState;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("channel not connected (state: {0:?})")]
    NotConnected(ConnectionState),

    #[error("reconnection abandoned after {attempts} attempts")]
    ReconnectionFailed { attempts: u32 },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SyncError {
    /// Connectivity problems the caller can ride out.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SyncError::ReconnectionFailed { .. })
    }
}
