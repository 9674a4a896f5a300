//! Match state: phase/turn state, full-state snapshots and the local board.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::*;
use crate::participant::Participant;
use crate::types::{ParticipantId, Sector, UnitElement, UnitId, Zone};

/// Whose turn it is and what phase the match is in.
///
/// Only the phase/turn state machine mutates this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPhaseState {
    pub phase: Phase,
    pub subphase: Subphase,
    /// 0 means no active turn.
    pub turn_number: u32,
    /// Only meaningful when `turn_number > 0`.
    pub active_participant_index: usize,
    pub clock_remaining_secs: u32,
}

impl MatchPhaseState {
    pub fn has_active_turn(&self) -> bool {
        self.turn_number > 0
    }
}

/// Full match state as broadcast by the relay (`estadoPartida` / `estadoActual`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub phase: Phase,
    pub subphase: Subphase,
    #[serde(default)]
    pub sector: Option<Sector>,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub elements: Vec<UnitElement>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub turn_number: u32,
    #[serde(default)]
    pub active_participant_id: Option<ParticipantId>,
    pub timestamp: DateTime<Utc>,
}

/// Whose eyes a snapshot is merged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub team: Team,
    pub is_director: bool,
}

impl Viewer {
    /// Directors see every zone; players only their own team's.
    pub fn may_update_zone(&self, team: Team) -> bool {
        self.is_director || self.team == team
    }
}

/// The locally known map content: sector, zones and units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchBoard {
    pub sector: Option<Sector>,
    pub zones: BTreeMap<Team, Zone>,
    pub elements: BTreeMap<UnitId, UnitElement>,
}

impl MatchBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace board content from a snapshot that already passed the staleness check.
    ///
    /// Sector and elements are replaced wholesale. Zones are filtered per viewer:
    /// zones for teams the viewer may not update are left untouched.
    pub fn merge_snapshot(&mut self, snapshot: &MatchSnapshot, viewer: Viewer) {
        if snapshot.sector.is_some() {
            self.sector = snapshot.sector.clone();
        }
        for zone in &snapshot.zones {
            if viewer.may_update_zone(zone.team) {
                self.zones.insert(zone.team, zone.clone());
            }
        }
        self.elements = snapshot
            .elements
            .iter()
            .map(|e| (e.id.clone(), e.clone()))
            .collect();
    }

    /// Apply a zone confirmation. Returns false when the viewer filter drops it.
    pub fn apply_zone(&mut self, zone: Zone, viewer: Viewer) -> bool {
        if !viewer.may_update_zone(zone.team) {
            return false;
        }
        self.zones.insert(zone.team, zone);
        true
    }

    pub fn has_zone(&self, team: Team) -> bool {
        self.zones.contains_key(&team)
    }

    pub fn upsert_element(&mut self, element: UnitElement) {
        self.elements.insert(element.id.clone(), element);
    }

    pub fn remove_element(&mut self, unit_id: &str) -> Option<UnitElement> {
        self.elements.remove(unit_id)
    }
}
