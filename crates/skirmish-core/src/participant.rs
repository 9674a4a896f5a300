//! Match participants and the director rule.

use serde::{Deserialize, Serialize};

use crate::enums::Team;
use crate::types::ParticipantId;

/// A player (or director) connected to the match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub team: Team,
    #[serde(default)]
    pub is_ready: bool,
    #[serde(default)]
    pub is_deployment_ready: bool,
    #[serde(default)]
    pub turns_completed: u32,
    /// Explicit director role. At most one participant should carry it.
    #[serde(default)]
    pub is_director: bool,
}

impl Participant {
    pub fn new(id: impl Into<ParticipantId>, name: impl Into<String>, team: Team) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            team,
            is_ready: false,
            is_deployment_ready: false,
            turns_completed: 0,
            is_director: false,
        }
    }

    /// Same participant with the explicit director role.
    pub fn director(mut self) -> Self {
        self.is_director = true;
        self
    }
}

/// Index of the effective director in `participants`.
///
/// An explicit director wins. Without one, the first participant of
/// `default_team` is the temporary director. `None` when neither exists.
pub fn effective_director_index(participants: &[Participant], default_team: Team) -> Option<usize> {
    participants
        .iter()
        .position(|p| p.is_director)
        .or_else(|| participants.iter().position(|p| p.team == default_team))
}
