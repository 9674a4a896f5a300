//! The single ingress and egress point for match events.
//!
//! Outbound: tags every intent with the local participant id and the wall
//! clock. Inbound: drops self-echoes and stale full-state snapshots, then
//! hands the envelope to registered handlers and to the caller.
//! Lifecycle: tracks connection state and drives reconnection through a
//! single cancellable retry task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use skirmish_core::enums::ConnectionState;
use skirmish_core::events::{Event, EventKind, SyncEnvelope};
use skirmish_core::session::SessionContext;
use skirmish_core::state::MatchSnapshot;

use crate::error::SyncError;
use crate::reconnect::ReconnectPolicy;
use crate::relay::LocalRelay;
use crate::transport::{Transport, TransportEvent};

type RemoteHandler = Box<dyn FnMut(&SyncEnvelope) + Send>;

/// Cloneable handle collaborators use to queue outbound intents.
///
/// Intents are drained by the channel's owner and sent through
/// [`SyncChannel::send_intent`] in queue order.
#[derive(Debug, Clone)]
pub struct IntentSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl IntentSender {
    /// Queue an intent. Returns false if the channel is gone.
    pub fn publish(&self, event: Event) -> bool {
        let kind = event.kind();
        let sent = self.tx.send(event).is_ok();
        if !sent {
            warn!(event = %kind, "intent dropped: channel closed");
        }
        sent
    }

    /// Sender whose intents go nowhere, plus the receiver to inspect them in tests.
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Work available to the channel's owner.
#[derive(Debug)]
pub enum ChannelInput {
    /// Something arrived from the transport (or the retry driver).
    Transport(TransportEvent),
    /// A collaborator queued an outbound intent.
    Intent(Event),
}

/// Why an inbound envelope was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    SelfEcho,
    StaleSnapshot,
}

/// Outcome of processing one transport event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    Connected { resumed: bool },
    Disconnected { reason: String },
    RetryScheduled { attempt: u32, delay: Duration },
    /// Terminal: retries exhausted. Must be surfaced to the user.
    ReconnectionFailed { attempts: u32 },
    Remote(SyncEnvelope),
    Dropped { kind: EventKind, reason: DropReason },
}

pub struct SyncChannel {
    session: SessionContext,
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    state: ConnectionState,
    reconnect_attempts: u32,
    /// Set after the first successful connection.
    has_connected: bool,
    retry: Option<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    intents_tx: mpsc::UnboundedSender<Event>,
    intents_rx: mpsc::UnboundedReceiver<Event>,
    /// Timestamp of the last applied full-state snapshot for this match.
    last_snapshot_at: Option<DateTime<Utc>>,
    handlers: HashMap<EventKind, Vec<RemoteHandler>>,
}

impl SyncChannel {
    /// Create a channel over `transport`. `events_tx`/`events_rx` is the queue the
    /// transport was attached to.
    pub fn new(
        session: SessionContext,
        transport: Arc<dyn Transport>,
        events_tx: mpsc::UnboundedSender<TransportEvent>,
        events_rx: mpsc::UnboundedReceiver<TransportEvent>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (intents_tx, intents_rx) = mpsc::unbounded_channel();
        Self {
            session,
            transport,
            policy,
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            has_connected: false,
            retry: None,
            events_tx,
            events_rx,
            intents_tx,
            intents_rx,
            last_snapshot_at: None,
            handlers: HashMap::new(),
        }
    }

    /// Channel attached to a room of a [`LocalRelay`].
    pub fn over_relay(session: SessionContext, relay: &LocalRelay, policy: ReconnectPolicy) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let endpoint = relay.attach(session.participant_id.clone(), events_tx.clone());
        Self::new(session, Arc::new(endpoint), events_tx, events_rx, policy)
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn last_snapshot_at(&self) -> Option<DateTime<Utc>> {
        self.last_snapshot_at
    }

    pub fn intent_sender(&self) -> IntentSender {
        IntentSender {
            tx: self.intents_tx.clone(),
        }
    }

    /// Register a handler for accepted inbound envelopes of `kind`.
    pub fn on_remote<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&SyncEnvelope) + Send + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
    }

    /// Initial connection. Failure feeds the retry driver and is returned.
    pub async fn connect(&mut self) -> Result<ChannelSignal, SyncError> {
        match self.transport.connect().await {
            Ok(()) => Ok(self.handle_transport_event(TransportEvent::Connected)),
            Err(e) => {
                let signal = self.handle_transport_event(TransportEvent::ConnectError {
                    message: e.to_string(),
                });
                if let ChannelSignal::ReconnectionFailed { attempts } = signal {
                    return Err(SyncError::ReconnectionFailed { attempts });
                }
                Err(SyncError::Transport(e))
            }
        }
    }

    /// Restart reconnection after a terminal failure, with a fresh attempt budget.
    pub async fn manual_reconnect(&mut self) -> Result<ChannelSignal, SyncError> {
        self.cancel_retry();
        self.reconnect_attempts = 0;
        self.state = ConnectionState::Disconnected;
        self.connect().await
    }

    /// Wait for the next transport event or queued intent.
    /// Transport events are drained first so state changes precede sends.
    pub async fn next_input(&mut self) -> Option<ChannelInput> {
        tokio::select! {
            biased;
            Some(ev) = self.events_rx.recv() => Some(ChannelInput::Transport(ev)),
            Some(intent) = self.intents_rx.recv() => Some(ChannelInput::Intent(intent)),
            else => None,
        }
    }

    /// Tag and transmit an intent.
    ///
    /// Not being connected is an expected condition: the intent is not sent and
    /// `NotConnected` is returned, nothing panics.
    pub async fn send_intent(&mut self, event: Event) -> Result<SyncEnvelope, SyncError> {
        if !self.is_connected() {
            debug!(event = %event.kind(), state = ?self.state, "intent not sent");
            return Err(SyncError::NotConnected(self.state));
        }
        let envelope = SyncEnvelope::new(event, self.session.participant_id.clone());
        self.transport.emit(&envelope).await?;
        debug!(event = %envelope.kind(), ts = %envelope.timestamp_iso(), "intent sent");
        Ok(envelope)
    }

    /// Send every queued intent. Returns how many went out.
    pub async fn flush_intents(&mut self) -> usize {
        let mut sent = 0;
        while let Ok(event) = self.intents_rx.try_recv() {
            match self.send_intent(event).await {
                Ok(_) => sent += 1,
                Err(e) => warn!(error = %e, "queued intent dropped"),
            }
        }
        sent
    }

    /// Process one transport event.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> ChannelSignal {
        match event {
            TransportEvent::Connected | TransportEvent::Reconnected => self.on_connected(),
            TransportEvent::Disconnected { reason } => {
                if self.state == ConnectionState::Failed {
                    return ChannelSignal::Disconnected { reason };
                }
                warn!(%reason, "disconnected");
                self.state = ConnectionState::Disconnected;
                if let signal @ ChannelSignal::ReconnectionFailed { .. } = self.schedule_retry() {
                    return signal;
                }
                ChannelSignal::Disconnected { reason }
            }
            TransportEvent::ConnectError { message } => {
                self.reconnect_attempts += 1;
                warn!(attempt = self.reconnect_attempts, %message, "connection attempt failed");
                self.schedule_retry()
            }
            TransportEvent::Message(envelope) => self.receive(envelope),
        }
    }

    /// Apply the inbound filters and dispatch.
    pub fn receive(&mut self, envelope: SyncEnvelope) -> ChannelSignal {
        let kind = envelope.kind();
        if self.session.is(&envelope.origin_participant_id) {
            debug!(event = %kind, "self-echo suppressed");
            return ChannelSignal::Dropped {
                kind,
                reason: DropReason::SelfEcho,
            };
        }
        if let Event::FullState(snapshot) = &envelope.event {
            if !self.accept_snapshot(snapshot) {
                return ChannelSignal::Dropped {
                    kind,
                    reason: DropReason::StaleSnapshot,
                };
            }
        }
        if let Some(handlers) = self.handlers.get_mut(&kind) {
            for handler in handlers.iter_mut() {
                handler(&envelope);
            }
        }
        ChannelSignal::Remote(envelope)
    }

    /// Staleness rule: accept only snapshots strictly newer than the last applied one.
    pub fn accept_snapshot(&mut self, snapshot: &MatchSnapshot) -> bool {
        match self.last_snapshot_at {
            Some(last) if snapshot.timestamp <= last => {
                debug!(
                    incoming = %snapshot.timestamp.to_rfc3339(),
                    last = %last.to_rfc3339(),
                    "stale snapshot discarded"
                );
                false
            }
            _ => {
                self.last_snapshot_at = Some(snapshot.timestamp);
                true
            }
        }
    }

    fn on_connected(&mut self) -> ChannelSignal {
        self.cancel_retry();
        let resumed = self.has_connected;
        self.has_connected = true;
        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        info!(resumed, participant = %self.session.participant_id, "connected");

        // Rejoin the room and ask for whatever we missed.
        let s = &self.session;
        let _ = self.intents_tx.send(Event::JoinMatch {
            match_code: s.match_code.clone(),
            participant_id: s.participant_id.clone(),
            name: s.display_name.clone(),
            team: s.team,
            is_director: s.is_director,
        });
        let request = if resumed {
            Event::RequestStateRefresh {
                match_code: s.match_code.clone(),
                participant_id: s.participant_id.clone(),
                team: s.team,
            }
        } else {
            Event::RequestState {
                match_code: s.match_code.clone(),
                participant_id: s.participant_id.clone(),
                team: s.team,
            }
        };
        let _ = self.intents_tx.send(request);
        ChannelSignal::Connected { resumed }
    }

    /// Schedule the next reconnection attempt, or give up.
    fn schedule_retry(&mut self) -> ChannelSignal {
        let attempt = self.reconnect_attempts + 1;
        if !self.policy.allows(attempt) {
            self.cancel_retry();
            self.state = ConnectionState::Failed;
            error!(
                attempts = self.reconnect_attempts,
                "reconnection failed, giving up"
            );
            return ChannelSignal::ReconnectionFailed {
                attempts: self.reconnect_attempts,
            };
        }

        let delay = self.policy.delay(attempt);
        self.state = ConnectionState::Reconnecting;
        self.cancel_retry();

        let transport = Arc::clone(&self.transport);
        let events = self.events_tx.clone();
        self.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let outcome = match transport.connect().await {
                Ok(()) => TransportEvent::Reconnected,
                Err(e) => TransportEvent::ConnectError {
                    message: e.to_string(),
                },
            };
            let _ = events.send(outcome);
        }));
        info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        ChannelSignal::RetryScheduled { attempt, delay }
    }

    fn cancel_retry(&mut self) {
        if let Some(handle) = self.retry.take() {
            handle.abort();
        }
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        self.cancel_retry();
    }
}
