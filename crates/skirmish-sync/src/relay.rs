//! In-process relay standing in for the match server.
//!
//! Rebroadcasts every envelope to all connected endpoints of the room,
//! including the sender, exactly like the real relay does. Envelopes go
//! through JSON on the way so the wire format is exercised. The relay can
//! be taken offline and can deliver with seeded random delays to produce
//! out-of-order arrival.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tracing::debug;

use skirmish_core::events::SyncEnvelope;

use crate::transport::{Transport, TransportError, TransportEvent};

struct Slot {
    participant_id: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    connected: bool,
}

struct RelayInner {
    online: bool,
    slots: Vec<Slot>,
    jitter: Option<(ChaCha8Rng, Duration)>,
}

/// A single match room.
#[derive(Clone)]
pub struct LocalRelay {
    inner: Arc<Mutex<RelayInner>>,
}

impl Default for LocalRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRelay {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RelayInner {
                online: true,
                slots: Vec::new(),
                jitter: None,
            })),
        }
    }

    /// Relay that delays each delivery by a random amount up to `max_delay`.
    /// Same seed, same delivery schedule.
    pub fn with_jitter(seed: u64, max_delay: Duration) -> Self {
        let relay = Self::new();
        relay.lock().jitter = Some((ChaCha8Rng::seed_from_u64(seed), max_delay));
        relay
    }

    fn lock(&self) -> MutexGuard<'_, RelayInner> {
        // A poisoned lock only means another endpoint panicked mid-delivery;
        // the slot table itself is still consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach a participant. Inbound traffic is pushed into `events`.
    pub fn attach(
        &self,
        participant_id: impl Into<String>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> RelayEndpoint {
        let mut inner = self.lock();
        inner.slots.push(Slot {
            participant_id: participant_id.into(),
            events,
            connected: false,
        });
        RelayEndpoint {
            relay: self.clone(),
            slot: inner.slots.len() - 1,
        }
    }

    /// Take the relay down or bring it back. Going down disconnects everyone.
    pub fn set_online(&self, online: bool) {
        let mut inner = self.lock();
        inner.online = online;
        if online {
            return;
        }
        for slot in inner.slots.iter_mut().filter(|s| s.connected) {
            slot.connected = false;
            debug!(participant = %slot.participant_id, "relay offline, participant dropped");
            let _ = slot.events.send(TransportEvent::Disconnected {
                reason: "relay offline".into(),
            });
        }
    }

    pub fn is_online(&self) -> bool {
        self.lock().online
    }

    /// Broadcast an event on behalf of the relay itself (or any origin).
    pub fn publish(&self, envelope: &SyncEnvelope) -> Result<usize, TransportError> {
        let wire = serde_json::to_string(envelope)?;
        let mut inner = self.lock();
        if !inner.online {
            return Err(TransportError::Offline);
        }

        let mut deliveries = Vec::new();
        let mut jitter = inner.jitter.take();
        for slot in inner.slots.iter().filter(|s| s.connected) {
            let delay = jitter.as_mut().map(|(rng, max)| {
                let max_ms = max.as_millis().max(1) as u64;
                Duration::from_millis(rng.gen_range(0..=max_ms))
            });
            deliveries.push((slot.events.clone(), delay));
        }
        inner.jitter = jitter;
        drop(inner);

        let count = deliveries.len();
        for (tx, delay) in deliveries {
            let envelope: SyncEnvelope = serde_json::from_str(&wire)?;
            match delay {
                Some(delay) if !delay.is_zero() => {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(TransportEvent::Message(envelope));
                    });
                }
                _ => {
                    let _ = tx.send(TransportEvent::Message(envelope));
                }
            }
        }
        debug!(recipients = count, "relay broadcast");
        Ok(count)
    }
}

/// One participant's connection to a [`LocalRelay`].
pub struct RelayEndpoint {
    relay: LocalRelay,
    slot: usize,
}

impl RelayEndpoint {
    /// Drop this endpoint's connection without taking the relay down.
    pub fn drop_connection(&self, reason: &str) {
        let mut inner = self.relay.lock();
        let Some(slot) = inner.slots.get_mut(self.slot) else {
            return;
        };
        if slot.connected {
            slot.connected = false;
            debug!(participant = %slot.participant_id, reason, "connection dropped");
            let _ = slot.events.send(TransportEvent::Disconnected {
                reason: reason.into(),
            });
        }
    }
}

#[async_trait]
impl Transport for RelayEndpoint {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut inner = self.relay.lock();
        if !inner.online {
            return Err(TransportError::Offline);
        }
        let slot = inner.slots.get_mut(self.slot).ok_or(TransportError::Closed)?;
        slot.connected = true;
        Ok(())
    }

    async fn emit(&self, envelope: &SyncEnvelope) -> Result<(), TransportError> {
        {
            let inner = self.relay.lock();
            let slot = inner.slots.get(self.slot).ok_or(TransportError::Closed)?;
            if !inner.online || !slot.connected {
                return Err(TransportError::Offline);
            }
        }
        self.relay.publish(envelope).map(|_| ())
    }
}
