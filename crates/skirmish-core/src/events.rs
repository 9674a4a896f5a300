//! Wire events exchanged through the relay.
//!
//! Every event travels inside a [`SyncEnvelope`]:
//! `{"event": "cambioTurno", "payload": {...}, "originParticipantId": "...", "timestamp": "..."}`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::*;
use crate::order::OrderIntent;
use crate::state::MatchSnapshot;
use crate::types::{Bounds, LatLng, ParticipantId, UnitElement, UnitId, ZoneStyle};

/// All turn, phase, board and order events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all_fields = "camelCase")]
pub enum Event {
    // --- Session ---
    #[serde(rename = "unirsePartida")]
    JoinMatch {
        match_code: String,
        participant_id: ParticipantId,
        name: String,
        team: Team,
        #[serde(default)]
        is_director: bool,
    },
    #[serde(rename = "salirPartida")]
    LeaveMatch { participant_id: ParticipantId },
    #[serde(rename = "solicitarEstado")]
    RequestState {
        match_code: String,
        participant_id: ParticipantId,
        team: Team,
    },
    #[serde(rename = "solicitarActualizacionEstado")]
    RequestStateRefresh {
        match_code: String,
        participant_id: ParticipantId,
        team: Team,
    },
    /// Full-state snapshot. Subject to the staleness rule.
    #[serde(rename = "estadoPartida", alias = "estadoActual")]
    FullState(MatchSnapshot),

    // --- Phase / turn ---
    #[serde(rename = "cambioFase")]
    PhaseChanged {
        phase: Phase,
        subphase: Subphase,
        participant_id: ParticipantId,
    },
    #[serde(rename = "sectorConfirmado")]
    SectorConfirmed {
        coordinates: Vec<LatLng>,
        bounds: Bounds,
        participant_id: ParticipantId,
    },
    #[serde(rename = "zonaConfirmada")]
    ZoneConfirmed {
        team: Team,
        coordinates: Vec<LatLng>,
        bounds: Bounds,
        #[serde(default)]
        style: Option<ZoneStyle>,
    },
    #[serde(rename = "cambioTurno")]
    TurnChanged {
        active_participant_id: ParticipantId,
        turn_number: u32,
    },
    #[serde(rename = "jugadorListoDespliegue")]
    DeploymentReady { participant_id: ParticipantId },
    #[serde(rename = "finTurno")]
    TurnEnded {
        participant_id: ParticipantId,
        turn_number: u32,
        forced: bool,
    },
    #[serde(rename = "finPartida")]
    MatchEnded {
        #[serde(default)]
        winner: Option<Team>,
        reason: String,
    },

    // --- Board ---
    #[serde(rename = "elementoCreado")]
    ElementCreated(UnitElement),
    #[serde(rename = "elementoMovido")]
    ElementMoved {
        unit_id: UnitId,
        position: LatLng,
        creator_id: ParticipantId,
    },
    #[serde(rename = "elementoEliminado")]
    ElementDeleted {
        unit_id: UnitId,
        creator_id: ParticipantId,
    },

    // --- Orders ---
    #[serde(rename = "ordenEnviada")]
    OrderSubmitted { order: OrderIntent },
}

/// Fieldless discriminant of [`Event`], used to key remote handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    JoinMatch,
    LeaveMatch,
    RequestState,
    RequestStateRefresh,
    FullState,
    PhaseChanged,
    SectorConfirmed,
    ZoneConfirmed,
    TurnChanged,
    DeploymentReady,
    TurnEnded,
    MatchEnded,
    ElementCreated,
    ElementMoved,
    ElementDeleted,
    OrderSubmitted,
}

impl EventKind {
    /// Event name on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            EventKind::JoinMatch => "unirsePartida",
            EventKind::LeaveMatch => "salirPartida",
            EventKind::RequestState => "solicitarEstado",
            EventKind::RequestStateRefresh => "solicitarActualizacionEstado",
            EventKind::FullState => "estadoPartida",
            EventKind::PhaseChanged => "cambioFase",
            EventKind::SectorConfirmed => "sectorConfirmado",
            EventKind::ZoneConfirmed => "zonaConfirmada",
            EventKind::TurnChanged => "cambioTurno",
            EventKind::DeploymentReady => "jugadorListoDespliegue",
            EventKind::TurnEnded => "finTurno",
            EventKind::MatchEnded => "finPartida",
            EventKind::ElementCreated => "elementoCreado",
            EventKind::ElementMoved => "elementoMovido",
            EventKind::ElementDeleted => "elementoEliminado",
            EventKind::OrderSubmitted => "ordenEnviada",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::JoinMatch { .. } => EventKind::JoinMatch,
            Event::LeaveMatch { .. } => EventKind::LeaveMatch,
            Event::RequestState { .. } => EventKind::RequestState,
            Event::RequestStateRefresh { .. } => EventKind::RequestStateRefresh,
            Event::FullState(_) => EventKind::FullState,
            Event::PhaseChanged { .. } => EventKind::PhaseChanged,
            Event::SectorConfirmed { .. } => EventKind::SectorConfirmed,
            Event::ZoneConfirmed { .. } => EventKind::ZoneConfirmed,
            Event::TurnChanged { .. } => EventKind::TurnChanged,
            Event::DeploymentReady { .. } => EventKind::DeploymentReady,
            Event::TurnEnded { .. } => EventKind::TurnEnded,
            Event::MatchEnded { .. } => EventKind::MatchEnded,
            Event::ElementCreated(_) => EventKind::ElementCreated,
            Event::ElementMoved { .. } => EventKind::ElementMoved,
            Event::ElementDeleted { .. } => EventKind::ElementDeleted,
            Event::OrderSubmitted { .. } => EventKind::OrderSubmitted,
        }
    }

    /// Full-state snapshots are the only events filtered by the staleness rule.
    pub fn is_full_state(&self) -> bool {
        matches!(self, Event::FullState(_))
    }
}

/// Wire-level wrapper tagging an event with its origin and send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEnvelope {
    #[serde(flatten)]
    pub event: Event,
    pub origin_participant_id: ParticipantId,
    pub timestamp: DateTime<Utc>,
}

impl SyncEnvelope {
    pub fn new(event: Event, origin_participant_id: impl Into<ParticipantId>) -> Self {
        Self::at(event, origin_participant_id, Utc::now())
    }

    pub fn at(
        event: Event,
        origin_participant_id: impl Into<ParticipantId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event,
            origin_participant_id: origin_participant_id.into(),
            timestamp,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    /// ISO-8601 timestamp as sent on the wire.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339()
    }
}
